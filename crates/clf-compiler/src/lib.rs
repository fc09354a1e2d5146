//! Compiles `ClusterLogForwarder` specifications into Vector collector configuration.
//!
//! The compiler is a pure function of the forwarder, an in-memory [`SecretStore`] and
//! [`CompileOptions`]. It renders a deterministic TOML document with embedded VRL programs and
//! reports every problem as a [`Diagnostic`](diagnostics::Diagnostic) instead of failing:
//!
//! ```
//! use clf_compiler::{ClusterLogForwarder, CompileOptions, SecretStore, compile};
//!
//! let forwarder = ClusterLogForwarder::from_yaml_str(
//!     "
//! outputs:
//!   - name: http
//!     type: http
//!     http:
//!       url: https://collector.example/logs
//! pipelines:
//!   - inputRefs: [application]
//!     outputRefs: [http]
//! inputs:
//!   - name: application
//!     type: application
//! ",
//! )
//! .expect("valid forwarder");
//!
//! let compiled = compile(&forwarder, &SecretStore::new(), &CompileOptions::default());
//! assert!(compiled.is_success());
//! assert!(compiled.render().contains("[sinks.output_http]"));
//! ```

pub mod audit_policy;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod field_path;
pub mod filters;
pub mod ids;
pub mod inputs;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod options;
pub mod outputs;
pub mod pipeline;
pub mod secret;
pub mod template;
pub mod vrl;

pub use compiler::{Compiled, compile};
pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use model::{ClusterLogForwarder, ForwarderSpec};
pub use options::CompileOptions;
pub use secret::{SecretReference, SecretStore};
