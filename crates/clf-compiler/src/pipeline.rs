//! Wires the sources of a pipeline's inputs through its filters into the tail transform its
//! outputs consume.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::Component,
    diagnostics::{Diagnostics, Kind, Subject},
    filters::{self, Error as FilterError},
    ids::{self, InputComponent, Role},
    inputs::InputSource,
    normalize::{Forwarder, Pipeline},
    options::CompileOptions,
    vrl::viaq::{self, LogSource},
};

/// The transforms of one pipeline.
#[derive(Clone, Debug)]
pub struct PipelineGraph {
    pub name: String,
    pub components: Vec<Component>,

    /// ID of the last transform, consumed by every output of the pipeline.
    pub tail: String,
}

impl InputComponent for PipelineGraph {
    fn input_ids(&self) -> Vec<String> {
        vec![self.tail.clone()]
    }
}

fn filter_error_kind(error: &FilterError) -> Kind {
    match error {
        FilterError::MalformedProgram { .. } => Kind::VrlCompileFailed,
        _ => Kind::SchemaInvalid,
    }
}

/// Builds the filters and the tail transform of `pipeline`.
///
/// `sources` holds the already built sources of every valid input. Filters which fail to build
/// are left out and reported, the pipeline continues with the remaining filters.
pub fn build(
    pipeline: &Pipeline,
    forwarder: &Forwarder,
    sources: &BTreeMap<String, InputSource>,
    options: &CompileOptions,
    diagnostics: &mut Diagnostics,
) -> PipelineGraph {
    let mut upstream: Vec<String> = Vec::new();
    let mut log_sources: BTreeSet<LogSource> = BTreeSet::new();
    for input_ref in &pipeline.input_refs {
        if let Some(source) = sources.get(input_ref) {
            upstream.extend(source.input_ids());
            log_sources.extend(source.log_sources.iter().copied());
        }
    }

    let mut components = Vec::new();
    for (position, filter_ref) in pipeline.filter_refs.iter().enumerate() {
        let Some(filter) = forwarder.filter(filter_ref) else {
            continue;
        };
        let id = ids::mint(
            Role::Pipeline,
            &[pipeline.name.as_str(), filter_ref, &position.to_string()],
        );
        match filters::build(filter, &id, upstream.clone()) {
            Ok(built) => {
                for warning in &built.warnings {
                    diagnostics.warn(
                        Kind::WildcardTooLoose,
                        Subject::Filter(filter.name.clone()),
                        warning.clone(),
                    );
                }
                upstream = built.input_ids();
                components.extend(built.components);
            }
            Err(error) => {
                tracing::warn!(
                    filter.name = %filter.name,
                    pipeline.name = %pipeline.name,
                    error = %error,
                    "bad filter"
                );
                diagnostics.error(
                    filter_error_kind(&error),
                    Subject::Filter(filter.name.clone()),
                    format!(
                        "{error}, the filter was left out of pipeline {:?}",
                        pipeline.name
                    ),
                );
            }
        }
    }

    let tail = ids::mint(
        Role::Pipeline,
        &[
            pipeline.name.as_str(),
            "viaq",
            &pipeline.filter_refs.len().to_string(),
        ],
    );
    components.push(
        Component::remap(
            &tail,
            upstream,
            viaq::project(&log_sources, &pipeline.labels, &options.cluster_id()),
        )
        .describe("Set the public record fields"),
    );

    tracing::debug!(
        pipeline.name = %pipeline.name,
        pipeline.tail = %tail,
        components = components.len(),
        "built pipeline"
    );
    PipelineGraph {
        name: pipeline.name.clone(),
        components,
        tail,
    }
}
