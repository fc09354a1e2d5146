use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::{input::LimitSpec, tls::OutputTlsSpec, tuning::OutputTuningSpec};
use crate::secret::SecretReference;

/// A named destination records are forwarded to.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Unique name of the output, referenced from `pipelines[].outputRefs`.
    pub name: String,

    /// The output type. The field of the same name carries the type specific configuration.
    #[serde(default, rename = "type")]
    pub output_type: String,

    #[serde(default)]
    pub tls: Option<OutputTlsSpec>,

    /// Limits the records forwarded by this output.
    #[serde(default)]
    pub rate_limit: Option<LimitSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_monitor: Option<AzureMonitorSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudwatch: Option<CloudwatchSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<ElasticsearchSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<KafkaSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki: Option<LokiSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<OtlpSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Spec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splunk: Option<SplunkSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog: Option<SyslogSpec>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[strum(serialize_all = "camelCase")]
pub enum OutputType {
    AzureMonitor,
    Cloudwatch,
    Elasticsearch,
    Http,
    Kafka,
    Loki,
    Otlp,
    S3,
    Splunk,
    Syslog,
}

/// Username/password or bearer token authentication.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpAuthentication {
    #[serde(default)]
    pub username: Option<SecretReference>,

    #[serde(default)]
    pub password: Option<SecretReference>,

    #[serde(default)]
    pub token: Option<SecretReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchSpec {
    pub url: String,

    /// Major version of the Elasticsearch API, 6, 7 or 8. Defaults to 8.
    #[serde(default)]
    pub version: Option<u8>,

    /// Index template, defaults to `{.log_type||"none"}`.
    #[serde(default)]
    pub index: Option<String>,

    #[serde(default)]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LokiSpec {
    pub url: String,

    /// Record paths sent as stream labels. Defaults to `log_type` and the namespace, pod and
    /// container names.
    #[serde(default)]
    pub label_keys: Vec<String>,

    /// Tenant template.
    #[serde(default)]
    pub tenant_key: Option<String>,

    #[serde(default)]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplunkSpec {
    pub url: String,

    pub authentication: SplunkAuthentication,

    /// Record path holding the index name. Takes precedence over `indexName`.
    #[serde(default)]
    pub index_key: Option<String>,

    /// Static index name.
    #[serde(default)]
    pub index_name: Option<String>,

    /// Record paths sent as indexed fields instead of as part of the event.
    #[serde(default)]
    pub indexed_fields: Vec<String>,

    /// Record path of the subtree sent as the event, defaults to the whole record.
    #[serde(default)]
    pub payload_key: Option<String>,

    /// Template of the event source.
    #[serde(default)]
    pub source: Option<String>,

    /// Template of the event source type. Defaults to `_json` for structured payloads.
    #[serde(default)]
    pub source_type: Option<String>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplunkAuthentication {
    /// HEC token.
    pub token: SecretReference,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSpec {
    /// Broker URL, e.g. `tls://kafka:9093/topic`. The path selects the topic if `topic` is not
    /// set.
    #[serde(default)]
    pub url: Option<String>,

    /// Additional brokers.
    #[serde(default)]
    pub brokers: Vec<String>,

    /// Topic template, defaults to `topic`.
    #[serde(default)]
    pub topic: Option<String>,

    #[serde(default)]
    pub authentication: Option<KafkaAuthentication>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaAuthentication {
    #[serde(default)]
    pub sasl: Option<SaslAuthentication>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaslAuthentication {
    #[serde(default)]
    pub username: Option<SecretReference>,

    #[serde(default)]
    pub password: Option<SecretReference>,

    /// SASL mechanism, defaults to `PLAIN`.
    #[serde(default)]
    pub mechanism: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyslogSpec {
    /// `tcp://`, `tls://` or `udp://` URL of the syslog server.
    pub url: String,

    /// `RFC3164` or `RFC5424`, defaults to `RFC5424`.
    #[serde(default)]
    pub rfc: Option<String>,

    #[serde(default)]
    pub facility: Option<String>,

    #[serde(default)]
    pub severity: Option<String>,

    #[serde(default)]
    pub app_name: Option<String>,

    #[serde(default)]
    pub proc_id: Option<String>,

    #[serde(default)]
    pub msg_id: Option<String>,

    /// Template of the message body, defaults to the whole record.
    #[serde(default)]
    pub payload_key: Option<String>,

    /// `None` or `KubernetesMinimal`.
    #[serde(default)]
    pub enrichment: Option<String>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSpec {
    pub url: String,

    /// HTTP method, defaults to `POST`.
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds, defaults to 10.
    #[serde(default)]
    pub timeout: Option<u32>,

    #[serde(default)]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudwatchSpec {
    /// Alternative endpoint, e.g. for a VPC endpoint.
    #[serde(default)]
    pub url: Option<String>,

    pub region: String,

    /// Template of the log group name, defaults to `{.log_type||"none"}`.
    #[serde(default)]
    pub group_name: Option<String>,

    pub authentication: AwsAuthentication,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Spec {
    /// Alternative endpoint, e.g. for S3 compatible stores.
    #[serde(default)]
    pub url: Option<String>,

    pub region: String,

    pub bucket: String,

    /// Template of the object key prefix, defaults to
    /// `{.log_type||"none"}/{@timestamp|date}/`.
    #[serde(default)]
    pub key_prefix: Option<String>,

    pub authentication: AwsAuthentication,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuthentication {
    /// Either `awsAccessKey` or `iamRole`.
    #[serde(rename = "type")]
    pub auth_type: String,

    #[serde(default)]
    pub aws_access_key: Option<AwsAccessKey>,

    #[serde(default)]
    pub iam_role: Option<AwsRole>,
}

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "camelCase")]
pub enum AwsAuthenticationType {
    AwsAccessKey,
    IamRole,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccessKey {
    pub key_id: SecretReference,
    pub key_secret: SecretReference,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsRole {
    /// Secret key holding the ARN of the role to assume.
    pub role_arn: SecretReference,

    /// Web identity token, defaults to the projected service account token.
    #[serde(default)]
    pub token: Option<SecretReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureMonitorSpec {
    pub customer_id: String,

    /// Record type of the Log Analytics workspace table.
    pub log_type: String,

    #[serde(default)]
    pub azure_resource_id: Option<String>,

    /// Alternative ingestion host, defaults to `ods.opinsights.azure.com`.
    #[serde(default)]
    pub host: Option<String>,

    pub authentication: AzureMonitorAuthentication,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureMonitorAuthentication {
    pub shared_key: SecretReference,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpec {
    /// Full URL of the OTLP logs endpoint, e.g. `https://collector:4318/v1/logs`.
    pub url: String,

    #[serde(default)]
    pub authentication: Option<HttpAuthentication>,

    #[serde(default)]
    pub tuning: Option<OutputTuningSpec>,
}
