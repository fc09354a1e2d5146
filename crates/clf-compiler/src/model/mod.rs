//! The forwarder specification as written by users.
//!
//! Tagged unions follow the Kubernetes convention of a `type` string plus one optional field
//! per variant. The types here mirror the documents one to one and do not validate anything,
//! see [`crate::normalize`] for that.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub mod audit;
pub mod filter;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod tls;
pub mod tuning;

pub use audit::*;
pub use filter::*;
pub use input::*;
pub use output::*;
pub use pipeline::*;
pub use tls::*;
pub use tuning::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse forwarder from YAML"))]
    ParseYaml { source: serde_yaml::Error },

    #[snafu(display("failed to parse forwarder from JSON"))]
    ParseJson { source: serde_json::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// The four sequences a forwarder consists of.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ForwarderSpec {
    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    #[serde(default)]
    pub filters: Vec<FilterSpec>,

    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
}

/// The subset of Kubernetes object metadata the compiler uses.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,
}

/// A complete `ClusterLogForwarder` object.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogForwarder {
    #[serde(default)]
    pub metadata: ObjectMeta,

    pub spec: ForwarderSpec,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Object(ClusterLogForwarder),
    Spec(ForwarderSpec),
}

impl From<Document> for ClusterLogForwarder {
    fn from(document: Document) -> Self {
        match document {
            Document::Object(object) => object,
            Document::Spec(spec) => Self {
                metadata: ObjectMeta::default(),
                spec,
            },
        }
    }
}

impl From<ForwarderSpec> for ClusterLogForwarder {
    fn from(spec: ForwarderSpec) -> Self {
        Self {
            metadata: ObjectMeta::default(),
            spec,
        }
    }
}

impl ClusterLogForwarder {
    /// Parses either a complete object (with `spec`) or a bare forwarder spec.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str::<Document>(input)
            .map(Into::into)
            .context(ParseYamlSnafu)
    }

    /// Parses either a complete object (with `spec`) or a bare forwarder spec.
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str::<Document>(input)
            .map(Into::into)
            .context(ParseJsonSnafu)
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("collector")
    }
}
