//! Renders the sinks of validated outputs.
//!
//! Every output renders to its sink, preceded by the transforms the sink needs (template
//! evaluation, routing, grouping). Each renderer takes the type specific spec together with a
//! [`RenderContext`] and returns the components in dependency order. Renderers never look at
//! secret values, they only reference secrets by token or path.

use snafu::Snafu;

use crate::{
    config::Component,
    diagnostics::Kind,
    field_path,
    ids,
    model::{OutputTlsSpec, ParseQuantityError},
    normalize::{Output, OutputKind},
    options::CompileOptions,
    secret::{SecretReference, SecretStore},
    template,
};

pub mod azure_monitor;
pub mod cloudwatch;
pub mod common;
pub mod elasticsearch;
pub mod http;
pub mod kafka;
pub mod loki;
pub mod otlp;
pub mod s3;
pub mod splunk;
pub mod syslog;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid URL {url:?}: {source}"))]
    InvalidUrl {
        source: url::ParseError,
        url: String,
    },

    #[snafu(display("URL {url:?} uses the scheme {scheme:?}, expected one of {allowed:?}"))]
    UnsupportedScheme {
        url: String,
        scheme: String,
        allowed: Vec<&'static str>,
    },

    #[snafu(display("URL {url:?} has no host"))]
    MissingHost { url: String },

    #[snafu(display("secret key {secret} is missing"))]
    MissingSecret { secret: SecretReference },

    #[snafu(display("{field} is not a valid template: {source}"))]
    InvalidTemplate {
        source: template::Error,
        field: String,
    },

    #[snafu(display("{field} is not a valid field path: {source}"))]
    InvalidFieldPath {
        source: field_path::Error,
        field: String,
    },

    #[snafu(display("{field} {value:?} is not a valid quantity: {source}"))]
    InvalidQuantity {
        source: ParseQuantityError,
        field: String,
        value: String,
    },

    #[snafu(display("compression {compression:?} is not supported, expected one of {allowed:?}"))]
    UnsupportedCompression {
        compression: String,
        allowed: Vec<&'static str>,
    },

    #[snafu(display("unknown delivery mode {mode:?}, expected atLeastOnce or atMostOnce"))]
    UnknownDeliveryMode { mode: String },

    #[snafu(display("Elasticsearch version {version} is not supported, expected 6, 7 or 8"))]
    UnsupportedVersion { version: u8 },

    #[snafu(display("unknown syslog RFC {rfc:?}, expected RFC3164 or RFC5424"))]
    UnknownRfc { rfc: String },

    #[snafu(display("unknown enrichment {enrichment:?}, expected None or KubernetesMinimal"))]
    UnknownEnrichment { enrichment: String },

    #[snafu(display("unknown authentication type {auth_type:?}, expected awsAccessKey or iamRole"))]
    UnknownAwsAuthType { auth_type: String },

    #[snafu(display("authentication type {auth_type} requires the field of the same name"))]
    MissingAwsCredentials { auth_type: String },

    #[snafu(display(
        "unknown TLS security profile {profile:?}, expected Old, Intermediate, Modern or Custom"
    ))]
    UnknownTlsProfile { profile: String },

    #[snafu(display("tls.certificate and tls.key must be set together"))]
    IncompleteClientCertificate,

    #[snafu(display("{what} must be set together"))]
    IncompleteCredentials { what: String },

    #[snafu(display("unsupported HTTP method {method:?}"))]
    UnsupportedMethod { method: String },

    #[snafu(display("at least one of url and brokers must be set"))]
    MissingBrokers,

    #[snafu(display("{field} must not be empty"))]
    EmptyField { field: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The diagnostic kind this problem is reported as.
    pub fn kind(&self) -> Kind {
        match self {
            Self::MissingSecret { .. } => Kind::SecretMissing,
            Self::UnsupportedCompression { .. }
            | Self::UnknownDeliveryMode { .. }
            | Self::UnsupportedVersion { .. }
            | Self::UnknownRfc { .. }
            | Self::UnknownEnrichment { .. }
            | Self::UnknownAwsAuthType { .. }
            | Self::UnknownTlsProfile { .. }
            | Self::UnsupportedMethod { .. } => Kind::EnumInvalid,
            Self::InvalidUrl { .. }
            | Self::UnsupportedScheme { .. }
            | Self::MissingHost { .. }
            | Self::InvalidTemplate { .. }
            | Self::InvalidFieldPath { .. }
            | Self::InvalidQuantity { .. }
            | Self::MissingAwsCredentials { .. }
            | Self::IncompleteClientCertificate
            | Self::IncompleteCredentials { .. }
            | Self::MissingBrokers
            | Self::EmptyField { .. } => Kind::SchemaInvalid,
        }
    }
}

/// Everything a renderer needs besides its type specific spec.
#[derive(Clone, Debug)]
pub struct RenderContext<'a> {
    /// ID of the sink. Transforms ahead of the sink derive their IDs from it.
    pub id: &'a str,

    /// Name of the output as declared.
    pub name: &'a str,

    /// Name of the forwarder the output belongs to.
    pub forwarder: &'a str,

    pub tls: Option<&'a OutputTlsSpec>,
    pub inputs: Vec<String>,
    pub options: &'a CompileOptions,
}

/// Every secret the output references, including its TLS material.
pub fn secret_refs(output: &Output) -> Vec<&SecretReference> {
    let mut refs: Vec<&SecretReference> = match &output.kind {
        OutputKind::AzureMonitor(spec) => vec![&spec.authentication.shared_key],
        OutputKind::Cloudwatch(spec) => common::aws_secret_refs(&spec.authentication),
        OutputKind::S3(spec) => common::aws_secret_refs(&spec.authentication),
        OutputKind::Elasticsearch(spec) => common::http_secret_refs(spec.authentication.as_ref()),
        OutputKind::Http(spec) => common::http_secret_refs(spec.authentication.as_ref()),
        OutputKind::Loki(spec) => common::http_secret_refs(spec.authentication.as_ref()),
        OutputKind::Otlp(spec) => common::http_secret_refs(spec.authentication.as_ref()),
        OutputKind::Kafka(spec) => spec
            .authentication
            .iter()
            .filter_map(|auth| auth.sasl.as_ref())
            .flat_map(|sasl| sasl.username.iter().chain(&sasl.password))
            .collect(),
        OutputKind::Splunk(spec) => vec![&spec.authentication.token],
        OutputKind::Syslog(_) => Vec::new(),
    };
    if let Some(tls) = &output.tls {
        refs.extend(
            tls.ca
                .iter()
                .chain(&tls.certificate)
                .chain(&tls.key)
                .chain(&tls.key_passphrase),
        );
    }
    refs
}

/// Every problem which prevents `output` from being rendered.
///
/// Missing secrets are all reported, rendering stops at the first problem of the output spec.
pub fn pre_check(output: &Output, secrets: &SecretStore) -> Vec<Error> {
    let mut problems: Vec<Error> = secrets
        .missing(secret_refs(output))
        .into_iter()
        .map(|secret| MissingSecretSnafu { secret: secret.clone() }.build())
        .collect();

    let options = CompileOptions::default();
    let context = RenderContext {
        id: &output.id,
        name: &output.name,
        forwarder: "",
        tls: output.tls.as_ref(),
        inputs: Vec::new(),
        options: &options,
    };
    if let Err(error) = render(&output.kind, &context) {
        problems.push(error);
    }
    problems
}

fn render(kind: &OutputKind, context: &RenderContext) -> Result<Vec<Component>> {
    match kind {
        OutputKind::AzureMonitor(spec) => azure_monitor::build(spec, context),
        OutputKind::Cloudwatch(spec) => cloudwatch::build(spec, context),
        OutputKind::Elasticsearch(spec) => elasticsearch::build(spec, context),
        OutputKind::Http(spec) => http::build(spec, context),
        OutputKind::Kafka(spec) => kafka::build(spec, context),
        OutputKind::Loki(spec) => loki::build(spec, context),
        OutputKind::Otlp(spec) => otlp::build(spec, context),
        OutputKind::S3(spec) => s3::build(spec, context),
        OutputKind::Splunk(spec) => splunk::build(spec, context),
        OutputKind::Syslog(spec) => syslog::build(spec, context),
    }
}

fn throttle(output: &Output, threshold: i64, inputs: Vec<String>) -> Component {
    Component::transform(ids::child(&output.id, "throttle"), "throttle", inputs)
        .with("threshold", threshold)
        .with("window_secs", 1i64)
        .describe(format!("Limit output {:?} to {threshold} records per second", output.name))
}

fn console(id: &str, inputs: Vec<String>) -> Component {
    Component::sink(id, "console", inputs)
        .with_table("encoding", common::encoding(Some("json"), &[]))
        .describe("Print records for debugging")
}

/// Builds the components of `output`, consuming `inputs`.
pub fn build(
    output: &Output,
    forwarder: &str,
    inputs: Vec<String>,
    secrets: &SecretStore,
    options: &CompileOptions,
) -> Result<Vec<Component>> {
    if let Some(secret) = secrets.missing(secret_refs(output)).into_iter().next() {
        return MissingSecretSnafu {
            secret: secret.clone(),
        }
        .fail();
    }

    let mut components = Vec::new();
    let mut inputs = inputs;
    if let Some(threshold) = output.max_records_per_second {
        let throttle = throttle(output, threshold, inputs);
        inputs = vec![throttle.id.clone()];
        components.push(throttle);
    }

    if options.debug_output {
        components.push(console(&output.id, inputs));
        return Ok(components);
    }

    let context = RenderContext {
        id: &output.id,
        name: &output.name,
        forwarder,
        tls: output.tls.as_ref(),
        inputs,
        options,
    };
    components.extend(render(&output.kind, &context)?);

    tracing::debug!(
        output.name = %output.name,
        output.type = %output.kind.output_type(),
        components = components.len(),
        "rendered output"
    );
    Ok(components)
}
