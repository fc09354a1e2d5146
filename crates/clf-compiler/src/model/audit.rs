use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A Kubernetes API server audit policy, applied to already recorded audit events.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPolicy {
    /// Events in these stages are dropped.
    #[serde(default)]
    pub omit_stages: Vec<String>,

    /// Events with these response codes are dropped. Defaults to 404, 409, 422 and 429, an
    /// explicit empty list keeps all events.
    #[serde(default)]
    pub omit_response_codes: Option<Vec<i64>>,

    /// Rules are evaluated in order, the first matching rule decides the level of an event.
    /// Events which match no rule are dropped. A built-in rule set is used if empty.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub level: AuditLevel,

    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub user_groups: Vec<String>,

    #[serde(default)]
    pub verbs: Vec<String>,

    #[serde(default)]
    pub resources: Vec<GroupResources>,

    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default, rename = "nonResourceURLs")]
    pub non_resource_urls: Vec<String>,

    /// Additional stages dropped for events matching this rule.
    #[serde(default)]
    pub omit_stages: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResources {
    /// API group, the empty string is the core group.
    #[serde(default)]
    pub group: Option<String>,

    /// Resources, optionally with a subresource like `pods/log`.
    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default)]
    pub resource_names: Vec<String>,
}

#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum AuditLevel {
    None,
    #[default]
    Metadata,
    Request,
    RequestResponse,
}
