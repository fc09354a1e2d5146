use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::audit::AuditPolicy;

/// A named transformation applied to the records of a pipeline.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Unique name of the filter, referenced from `pipelines[].filterRefs`.
    pub name: String,

    /// One of `kubeAPIAudit`, `drop`, `prune`, `detectMultilineException`, `parse` or
    /// `openshiftLabels`.
    #[serde(default, rename = "type")]
    pub filter_type: String,

    #[serde(default, rename = "kubeAPIAudit", skip_serializing_if = "Option::is_none")]
    pub kube_api_audit: Option<AuditPolicy>,

    /// Records matching any of the tests are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<Vec<DropTest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<PruneFilterSpec>,

    /// Labels added to `.openshift.labels`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openshift_labels: Option<BTreeMap<String, String>>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum FilterType {
    #[strum(serialize = "kubeAPIAudit")]
    KubeApiAudit,

    #[strum(serialize = "drop")]
    Drop,

    #[strum(serialize = "prune")]
    Prune,

    #[strum(serialize = "detectMultilineException")]
    DetectMultilineException,

    #[strum(serialize = "parse")]
    Parse,

    #[strum(serialize = "openshiftLabels")]
    OpenshiftLabels,
}

/// A conjunction of conditions. A record matches the test if it matches all conditions.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTest {
    #[serde(default)]
    pub test: Vec<DropCondition>,
}

/// A regular expression checked against the string value of a record field. Exactly one of
/// `matches` and `notMatches` must be set.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCondition {
    /// Path of the field, e.g. `.kubernetes.namespace_name`.
    pub field: String,

    #[serde(default)]
    pub matches: Option<String>,

    #[serde(default)]
    pub not_matches: Option<String>,
}

/// Removes fields from records.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneFilterSpec {
    /// Fields to remove.
    #[serde(default, rename = "in")]
    pub in_: Vec<String>,

    /// Fields to keep, all others are removed.
    #[serde(default)]
    pub not_in: Vec<String>,
}
