//! `tracing` setup for binaries embedding the compiler.

use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Suffix of the rotated log files.
pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

const MAX_LOG_FILES: usize = 6;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {}", directory.display()))]
    InitRollingFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: TryInitError },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Reads the filter directives from `env`, falling back to INFO.
fn env_filter(env: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(env)
        .from_env_lossy()
}

/// An hourly rotated appender writing `<app_name>.<date>.tracing-rs.json` files into `directory`.
pub fn file_appender(directory: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(app_name)
        .filename_suffix(FILE_LOG_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(directory)
        .context(InitRollingFileAppenderSnafu { directory })
}

/// Initializes `tracing` logging with options from the environment variable given in the `env`
/// parameter, e.g. `CLF_COMPILER_LOG`. Without it, the maximum log level is INFO.
///
/// Log output is also written as JSON to rotated files when `{env}_DIRECTORY` (e.g.
/// `CLF_COMPILER_LOG_DIRECTORY`) names a directory.
pub fn initialize_logging(env: &str, app_name: &str) -> Result<()> {
    let directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_layer = directory
        .as_deref()
        .map(|directory| file_appender(directory, app_name))
        .transpose()?
        .map(|appender| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(appender)
                .with_filter(env_filter(env))
        });

    Registry::default()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter(env)))
        .with(file_layer)
        .try_init()
        .context(SetGlobalDefaultSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match directory {
        Some(directory) => tracing::info!(directory = %directory.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }
    Ok(())
}
