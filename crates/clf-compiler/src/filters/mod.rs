//! Transforms applied by pipelines to the records flowing from their inputs to their outputs.
//!
//! User filters see the normalized record below `._internal`, a field path `.level` refers to
//! `._internal.level`. Fields of API server audit events are looked up in the parsed event as
//! well.

use snafu::{ResultExt, Snafu};

use crate::{
    config::{Component, Value},
    field_path::{self, FieldPath},
    ids::{self, InputComponent},
    normalize::{Filter, FilterKind},
    vrl::{self, viaq},
};

pub mod drop;
pub mod kube_api_audit;
pub mod prune;

const PARSE_JSON_MESSAGE: &str = r#"
parsed, err = parse_json(string(._internal.message) ?? "")
if err == null && is_object(parsed) {
  ._internal.structured = parsed
}
"#;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid field {field:?}"))]
    InvalidField {
        source: field_path::Error,
        field: String,
    },

    #[snafu(display("test {test} must not be empty"))]
    EmptyTest { test: usize },

    #[snafu(display(
        "condition on {field:?} in test {test} must set exactly one of matches and notMatches"
    ))]
    AmbiguousCondition { field: String, test: usize },

    #[snafu(display("condition on {field:?} in test {test} has an invalid regular expression"))]
    InvalidRegex {
        source: regex::Error,
        field: String,
        test: usize,
    },

    #[snafu(display("the fields {fields:?} are required and cannot be pruned"))]
    PrunesRequiredFields { fields: Vec<String> },

    #[snafu(display("the required fields {fields:?} are missing from notIn"))]
    MissingRequiredFields { fields: Vec<String> },

    #[snafu(display("generated program of component {id:?} is malformed"))]
    MalformedProgram { source: vrl::Error, id: String },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// The value of a user supplied field path. Falls back to the parsed audit event, whose fields
/// become top level fields of the record.
pub(crate) fn field_value(path: &FieldPath) -> String {
    let internal = path.under("._internal");
    if path.segments().first().is_some_and(|s| s == "structured") {
        internal
    } else {
        format!("{internal} || {}", path.under("._internal.structured"))
    }
}

pub(crate) fn parse_path(field: &str) -> Result<FieldPath> {
    field.parse().context(InvalidFieldSnafu { field })
}

/// The components implementing one filter of a pipeline.
#[derive(Clone, Debug)]
pub struct PipelineFilter {
    /// The minted ID, carried by the last component.
    pub id: String,
    pub components: Vec<Component>,

    /// Problems which do not prevent the filter from being used.
    pub warnings: Vec<String>,
}

impl InputComponent for PipelineFilter {
    fn input_ids(&self) -> Vec<String> {
        vec![self.id.clone()]
    }
}

impl PipelineFilter {
    fn single(component: Component) -> Self {
        Self {
            id: component.id.clone(),
            components: vec![component],
            warnings: Vec::new(),
        }
    }
}

/// Groups stack traces spread over several records of the same container into one record.
fn detect_multiline_exception(id: &str, inputs: Vec<String>) -> PipelineFilter {
    let lift_id = ids::child(id, "lift");
    let detect_id = ids::child(id, "detect");
    let lift = Component::remap(&lift_id, inputs, ".message = del(._internal.message)");
    let detect = Component::transform(&detect_id, "detect_exceptions", vec![lift_id])
        .with("languages", Value::strings(["All"]))
        .with(
            "group_by",
            Value::strings([
                "_internal.kubernetes.namespace_name",
                "_internal.kubernetes.pod_name",
                "_internal.kubernetes.container_name",
                "_internal.kubernetes.pod_id",
            ]),
        )
        .with("expire_after_ms", 2_000i64)
        .with("multiline_flush_interval_ms", 1_000i64);
    let restore = Component::remap(id, vec![detect_id], "._internal.message = del(.message)");
    PipelineFilter {
        id: id.to_owned(),
        components: vec![lift, detect, restore],
        warnings: Vec::new(),
    }
}

/// Builds the components of `filter` with the given ID, consuming `inputs`.
pub fn build(filter: &Filter, id: &str, inputs: Vec<String>) -> Result<PipelineFilter> {
    let built = match &filter.kind {
        FilterKind::KubeApiAudit(policy) => kube_api_audit::build(policy, id, inputs),
        FilterKind::Drop(tests) => PipelineFilter::single(drop::build(tests, id, inputs)?),
        FilterKind::Prune(prune) => {
            PipelineFilter::single(Component::remap(id, inputs, prune::program(prune)?))
        }
        FilterKind::DetectMultilineException => detect_multiline_exception(id, inputs),
        FilterKind::Parse => PipelineFilter::single(Component::remap(
            id,
            inputs,
            PARSE_JSON_MESSAGE.trim(),
        )),
        FilterKind::OpenshiftLabels(labels) => {
            PipelineFilter::single(Component::remap(id, inputs, viaq::openshift_labels(labels)))
        }
    };

    for component in &built.components {
        let program = match (component.vrl(), component.table.get("condition")) {
            (Some(program), _) => program,
            (None, Some(Value::Vrl(program))) => program.as_str(),
            _ => continue,
        };
        vrl::check(program).context(MalformedProgramSnafu {
            id: component.id.clone(),
        })?;
    }

    tracing::debug!(filter.name = %filter.name, filter.id = id, "built filter");
    Ok(built)
}
