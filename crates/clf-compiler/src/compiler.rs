//! Compiles a [`ClusterLogForwarder`] into the collector configuration.
//!
//! Compilation never fails as a whole. Every problem is recorded as a [`Diagnostic`] and the
//! item it concerns is left out, see [`compile`].
//!
//! [`Diagnostic`]: crate::diagnostics::Diagnostic

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    config::{Component, ComponentKind, Config},
    diagnostics::{Diagnostics, Kind, Subject},
    inputs::{self, InputSource},
    model::ClusterLogForwarder,
    normalize::{self, Forwarder},
    options::CompileOptions,
    outputs,
    pipeline::{self, PipelineGraph},
    secret::SecretStore,
};

/// The result of compiling a forwarder.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Compiled {
    pub config: Config,
    pub diagnostics: Diagnostics,
}

impl Compiled {
    /// Whether at least one sink was rendered.
    pub fn is_success(&self) -> bool {
        self.config.sinks().next().is_some()
    }

    /// The configuration as TOML, empty if nothing could be rendered.
    pub fn render(&self) -> String {
        self.config.render()
    }
}

/// Compiles `forwarder`, resolving secret references against `secrets`.
///
/// Invalid inputs, filters, outputs and pipelines are reported and left out. If no sink
/// remains, the configuration is empty.
pub fn compile(
    forwarder: &ClusterLogForwarder,
    secrets: &SecretStore,
    options: &CompileOptions,
) -> Compiled {
    let mut diagnostics = Diagnostics::new();
    let forwarder = normalize::normalize(forwarder, secrets, &mut diagnostics);

    let mut claimed = ClaimedIds::default();

    let mut sources = build_sources(&forwarder, options);
    for input in &forwarder.inputs {
        let Some(source) = sources.get(&input.name) else {
            continue;
        };
        let subject = Subject::Input(input.name.clone());
        if !claimed.claim(&subject, &source.components, &mut diagnostics) {
            sources.remove(&input.name);
        }
    }

    let mut pipelines: Vec<(&normalize::Pipeline, PipelineGraph)> = Vec::new();
    for pipeline in &forwarder.pipelines {
        let subject = Subject::Pipeline(pipeline.name.clone());
        if !pipeline.input_refs.iter().any(|r| sources.contains_key(r)) {
            diagnostics.error(
                Kind::Ambiguous,
                subject,
                "none of the pipeline's inputs remain, the pipeline was left out",
            );
            continue;
        }
        let graph = pipeline::build(pipeline, &forwarder, &sources, options, &mut diagnostics);
        if claimed.claim(&subject, &graph.components, &mut diagnostics) {
            pipelines.push((pipeline, graph));
        }
    }

    let mut components: Vec<Component> = forwarder
        .inputs
        .iter()
        .filter_map(|input| sources.get(&input.name))
        .flat_map(|source| source.components.iter().cloned())
        .collect();
    components.extend(pipelines.iter().flat_map(|(_, graph)| graph.components.iter().cloned()));

    for output in &forwarder.outputs {
        let inputs: Vec<String> = pipelines
            .iter()
            .filter(|(pipeline, _)| pipeline.output_refs.contains(&output.name))
            .map(|(_, graph)| graph.tail.clone())
            .collect();
        if inputs.is_empty() {
            continue;
        }

        match outputs::build(output, &forwarder.name, inputs, secrets, options) {
            Ok(built) => {
                let subject = Subject::Output(output.name.clone());
                if claimed.claim(&subject, &built, &mut diagnostics) {
                    components.extend(built);
                }
            }
            Err(error) => {
                tracing::warn!(
                    output.name = %output.name,
                    error = %error,
                    "bad output"
                );
                diagnostics.error(
                    error.kind(),
                    Subject::Output(output.name.clone()),
                    error.to_string(),
                );
            }
        }
    }

    let mut config = Config::new();
    for component in consumed(components) {
        config.push(component);
    }

    if config.sinks().next().is_none() {
        config = Config::new();
        diagnostics.error(
            Kind::SchemaInvalid,
            Subject::Forwarder,
            "no output could be rendered, the configuration is empty",
        );
    }

    tracing::info!(
        forwarder.name = %forwarder.name,
        components = config.components().len(),
        errors = diagnostics.errors().count(),
        warnings = diagnostics.warnings().count(),
        "compiled forwarder"
    );
    Compiled {
        config,
        diagnostics,
    }
}

/// The component IDs already taken, with the item that took them.
#[derive(Debug, Default)]
struct ClaimedIds(HashMap<String, Subject>);

impl ClaimedIds {
    /// Claims the IDs of `components` for `subject`.
    ///
    /// If one of them is taken already, nothing is claimed, the collision is reported and
    /// `false` is returned. The first item to use an ID keeps it.
    fn claim(
        &mut self,
        subject: &Subject,
        components: &[Component],
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let mut ids = BTreeSet::new();
        for component in components {
            let taken_by = self
                .0
                .get(&component.id)
                .cloned()
                .or_else(|| (!ids.insert(component.id.as_str())).then(|| subject.clone()));
            if let Some(taken_by) = taken_by {
                tracing::warn!(
                    component.id = %component.id,
                    %subject,
                    %taken_by,
                    "component ID collision"
                );
                diagnostics.warn(
                    Kind::Ambiguous,
                    subject.clone(),
                    format!(
                        "the component ID {id:?} is already used by {taken_by}, only the first declaration is used",
                        id = component.id
                    ),
                );
                return false;
            }
        }
        self.0
            .extend(ids.into_iter().map(|id| (id.to_owned(), subject.clone())));
        true
    }
}

/// Builds the sources of every input some pipeline reads from.
fn build_sources(forwarder: &Forwarder, options: &CompileOptions) -> BTreeMap<String, InputSource> {
    forwarder
        .inputs
        .iter()
        .filter(|input| {
            forwarder
                .pipelines
                .iter()
                .any(|pipeline| pipeline.input_refs.contains(&input.name))
        })
        .map(|input| (input.name.clone(), inputs::build(input, options)))
        .collect()
}

/// Keeps the components a sink consumes, directly or through other components.
///
/// Inputs referring to a route of a `route` transform (`<id>.<route>`) count for the transform.
fn consumed(components: Vec<Component>) -> Vec<Component> {
    let by_id: HashMap<&str, &Component> = components.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut keep: BTreeSet<&str> = BTreeSet::new();
    let mut pending: Vec<&str> = components
        .iter()
        .filter(|c| c.kind == ComponentKind::Sinks)
        .map(|c| c.id.as_str())
        .collect();

    while let Some(id) = pending.pop() {
        if !keep.insert(id) {
            continue;
        }
        if let Some(component) = by_id.get(id) {
            pending.extend(
                component
                    .inputs
                    .iter()
                    .map(|input| input.split('.').next().unwrap_or(input.as_str())),
            );
        }
    }

    let keep: BTreeSet<String> = keep.into_iter().map(str::to_owned).collect();
    components
        .into_iter()
        .filter(|c| keep.contains(&c.id))
        .collect()
}
