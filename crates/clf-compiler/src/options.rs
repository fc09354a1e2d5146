use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{CLUSTER_ID_ENV, DEFAULT_NODE_NAME_ENV};

/// Options which influence how a forwarder is compiled, but are not part of the forwarder
/// itself.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Render every output as a `console` sink printing JSON, for debugging pipelines.
    #[serde(default)]
    pub debug_output: bool,

    /// The cluster-wide minimum TLS version, e.g. `VersionTLS12`. Used for outputs which do not
    /// configure a security profile.
    #[serde(default)]
    pub tls_profile_min_version: Option<String>,

    /// The cluster-wide list of TLS cipher suites.
    #[serde(default)]
    pub tls_profile_ciphers: Vec<String>,

    /// Fixed cluster ID to write into `.openshift.cluster_id`. By default the collector reads
    /// the `OPENSHIFT_CLUSTER_ID` environment variable.
    #[serde(default, rename = "openshiftClusterID")]
    pub openshift_cluster_id: Option<String>,

    /// Environment variable holding the node name, defaults to `VECTOR_SELF_NODE_NAME`.
    #[serde(default)]
    pub collector_self_node_name_env: Option<String>,
}

impl CompileOptions {
    pub fn node_name_env(&self) -> &str {
        self.collector_self_node_name_env
            .as_deref()
            .filter(|env| !env.is_empty())
            .unwrap_or(DEFAULT_NODE_NAME_ENV)
    }

    /// The value written into `.openshift.cluster_id`, either fixed or read from the
    /// environment by the collector.
    pub fn cluster_id(&self) -> String {
        match &self.openshift_cluster_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("${{{CLUSTER_ID_ENV}:-}}"),
        }
    }
}
