use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A named source of log records.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    /// Unique name of the input, referenced from `pipelines[].inputRefs`.
    pub name: String,

    /// One of `application`, `infrastructure`, `audit` or `receiver`. The field of the same
    /// name carries the input specific configuration.
    #[serde(default, rename = "type")]
    pub input_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<InfrastructureSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverSpec>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[strum(serialize_all = "camelCase")]
pub enum InputType {
    Application,
    Infrastructure,
    Audit,
    Receiver,
}

/// Container logs of application namespaces.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Namespace and container globs to collect. Collects all application namespaces if empty.
    #[serde(default)]
    pub includes: Vec<NamespaceContainerSpec>,

    /// Namespace and container globs not to collect.
    #[serde(default)]
    pub excludes: Vec<NamespaceContainerSpec>,

    /// Only collect logs of pods matching this selector.
    #[serde(default)]
    pub selector: Option<LabelSelector>,

    #[serde(default)]
    pub tuning: Option<ContainerInputTuningSpec>,
}

/// A pair of globs. `*` matches any sequence of characters, a missing value matches everything.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceContainerSpec {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub container: Option<String>,
}

/// Kubernetes style label selector.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,

    /// One of `In`, `NotIn`, `Exists` and `DoesNotExist`.
    pub operator: String,

    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, PartialEq)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInputTuningSpec {
    #[serde(default)]
    pub rate_limit_per_container: Option<LimitSpec>,
}

/// A record rate limit.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitSpec {
    #[serde(default)]
    pub max_records_per_second: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {
    /// Subset of `container` and `node`. All sources are collected if empty.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[strum(serialize_all = "camelCase")]
pub enum InfrastructureSource {
    Container,
    Node,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSpec {
    /// Subset of `auditd`, `kubeAPI`, `openshiftAPI` and `ovn`. All sources are collected if
    /// empty.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum AuditSource {
    #[strum(serialize = "auditd")]
    Auditd,

    #[strum(serialize = "kubeAPI")]
    KubeApi,

    #[strum(serialize = "openshiftAPI")]
    OpenshiftApi,

    #[strum(serialize = "ovn")]
    Ovn,
}

/// A network endpoint other collectors or the API server push records to.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverSpec {
    /// Either `syslog` or `http`.
    #[serde(default, rename = "type")]
    pub receiver_type: String,

    /// Port to listen on. Defaults to 8443 for HTTP and 10514 for syslog receivers.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub http: Option<HttpReceiverSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpReceiverSpec {
    /// Format of the received records, only `kubeAPIAudit` is supported.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[strum(serialize_all = "camelCase")]
pub enum ReceiverType {
    Syslog,
    Http,
}

impl ReceiverType {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Syslog => 10514,
            Self::Http => 8443,
        }
    }
}
