use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Routes the records of a set of inputs through filters to a set of outputs.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Name of the pipeline, `pipeline_<index>` if empty.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub input_refs: Vec<String>,

    /// Filters applied in order.
    #[serde(default)]
    pub filter_refs: Vec<String>,

    #[serde(default)]
    pub output_refs: Vec<String>,

    /// Static labels added to `.openshift.labels` of every record.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}
