//! Validates a [`ClusterLogForwarder`] and turns its tagged unions into Rust enums.
//!
//! Problems are recorded as [`Diagnostics`]. An invalid item is left out of the normalized
//! [`Forwarder`], everything else is kept.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    str::FromStr,
};

use strum::IntoEnumIterator;

use crate::{
    diagnostics::{Diagnostics, Kind, Subject},
    ids::{self, Role},
    model::{
        AuditPolicy, AuditSource, AzureMonitorSpec, ClusterLogForwarder, CloudwatchSpec, DropTest,
        ElasticsearchSpec, FilterSpec, FilterType, HttpSpec, InfrastructureSource, InputSpec,
        InputType, KafkaSpec, LabelSelector, LimitSpec, LokiSpec, NamespaceContainerSpec, OtlpSpec,
        OutputSpec, OutputTlsSpec, OutputTuningSpec, OutputType, PipelineSpec, PruneFilterSpec,
        ReceiverType, S3Spec, SelectorOperator, SplunkSpec, SyslogSpec,
    },
    outputs,
    secret::SecretStore,
};

/// A validated forwarder.
#[derive(Clone, Debug, Default)]
pub struct Forwarder {
    pub name: String,
    pub inputs: Vec<Input>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<Output>,
    pub pipelines: Vec<Pipeline>,
}

impl Forwarder {
    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct Input {
    pub name: String,
    pub id: String,
    pub kind: InputKind,
}

#[derive(Clone, Debug)]
pub enum InputKind {
    Application {
        includes: Vec<NamespaceContainerSpec>,
        excludes: Vec<NamespaceContainerSpec>,
        selector: Option<LabelSelector>,
        max_records_per_second: Option<i64>,
    },
    Infrastructure {
        sources: BTreeSet<InfrastructureSource>,
    },
    Audit {
        sources: BTreeSet<AuditSource>,
    },
    Receiver {
        receiver_type: ReceiverType,
        port: u16,
    },
}

#[derive(Clone, Debug)]
pub struct Filter {
    pub name: String,
    pub kind: FilterKind,
}

#[derive(Clone, Debug)]
pub enum FilterKind {
    KubeApiAudit(AuditPolicy),
    Drop(Vec<DropTest>),
    Prune(PruneFilterSpec),
    DetectMultilineException,
    Parse,
    OpenshiftLabels(BTreeMap<String, String>),
}

#[derive(Clone, Debug)]
pub struct Output {
    pub name: String,
    pub id: String,
    pub kind: OutputKind,
    pub tls: Option<OutputTlsSpec>,
    pub max_records_per_second: Option<i64>,
}

#[derive(Clone, Debug)]
pub enum OutputKind {
    AzureMonitor(AzureMonitorSpec),
    Cloudwatch(CloudwatchSpec),
    Elasticsearch(ElasticsearchSpec),
    Http(HttpSpec),
    Kafka(KafkaSpec),
    Loki(LokiSpec),
    Otlp(OtlpSpec),
    S3(S3Spec),
    Splunk(SplunkSpec),
    Syslog(SyslogSpec),
}

impl OutputKind {
    pub fn output_type(&self) -> OutputType {
        match self {
            Self::AzureMonitor(_) => OutputType::AzureMonitor,
            Self::Cloudwatch(_) => OutputType::Cloudwatch,
            Self::Elasticsearch(_) => OutputType::Elasticsearch,
            Self::Http(_) => OutputType::Http,
            Self::Kafka(_) => OutputType::Kafka,
            Self::Loki(_) => OutputType::Loki,
            Self::Otlp(_) => OutputType::Otlp,
            Self::S3(_) => OutputType::S3,
            Self::Splunk(_) => OutputType::Splunk,
            Self::Syslog(_) => OutputType::Syslog,
        }
    }

    pub fn tuning(&self) -> Option<&OutputTuningSpec> {
        match self {
            Self::AzureMonitor(spec) => spec.tuning.as_ref(),
            Self::Cloudwatch(spec) => spec.tuning.as_ref(),
            Self::Elasticsearch(spec) => spec.tuning.as_ref(),
            Self::Http(spec) => spec.tuning.as_ref(),
            Self::Kafka(spec) => spec.tuning.as_ref(),
            Self::Loki(spec) => spec.tuning.as_ref(),
            Self::Otlp(spec) => spec.tuning.as_ref(),
            Self::S3(spec) => spec.tuning.as_ref(),
            Self::Splunk(spec) => spec.tuning.as_ref(),
            Self::Syslog(spec) => spec.tuning.as_ref(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    pub name: String,
    pub input_refs: Vec<String>,
    pub filter_refs: Vec<String>,
    pub output_refs: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// Validates the forwarder, recording every problem in `diagnostics`.
pub fn normalize(
    forwarder: &ClusterLogForwarder,
    secrets: &SecretStore,
    diagnostics: &mut Diagnostics,
) -> Forwarder {
    let spec = &forwarder.spec;

    let inputs = unique(&spec.inputs, |i| &i.name, Subject::Input, diagnostics)
        .into_iter()
        .filter_map(|(name, input)| normalize_input(name, input, diagnostics))
        .collect::<Vec<_>>();
    let inputs = unique_ids(inputs, |i| (&i.name, &i.id), Subject::Input, diagnostics);

    let filters = unique(&spec.filters, |f| &f.name, Subject::Filter, diagnostics)
        .into_iter()
        .filter_map(|(name, filter)| normalize_filter(name, filter, diagnostics))
        .collect::<Vec<_>>();

    let outputs = unique(&spec.outputs, |o| &o.name, Subject::Output, diagnostics)
        .into_iter()
        .filter_map(|(name, output)| normalize_output(name, output, diagnostics))
        .collect::<Vec<_>>()
        .into_iter()
        .filter(|output| {
            let problems = outputs::pre_check(output, secrets);
            for problem in &problems {
                diagnostics.error(
                    problem.kind(),
                    Subject::Output(output.name.clone()),
                    problem.to_string(),
                );
            }
            problems.is_empty()
        })
        .collect::<Vec<_>>();
    let outputs = unique_ids(outputs, |o| (&o.name, &o.id), Subject::Output, diagnostics);

    let mut normalized = Forwarder {
        name: forwarder.name().to_owned(),
        inputs,
        filters,
        outputs,
        pipelines: Vec::new(),
    };

    let named_pipelines: Vec<(String, &PipelineSpec)> = spec
        .pipelines
        .iter()
        .enumerate()
        .map(|(index, pipeline)| {
            let name = match pipeline.name.trim() {
                "" => format!("pipeline_{index}"),
                name => name.to_owned(),
            };
            (name, pipeline)
        })
        .collect();
    let named_pipelines = unique(
        &named_pipelines,
        |(name, _)| name,
        Subject::Pipeline,
        diagnostics,
    );
    normalized.pipelines = named_pipelines
        .into_iter()
        .filter_map(|(name, (_, pipeline))| {
            normalize_pipeline(name, pipeline, spec, &normalized, diagnostics)
        })
        .collect();

    report_unreferenced(&normalized, diagnostics);
    normalized
}

/// Trims names, dropping empty names and keeping the first of duplicate names.
fn unique<'a, T>(
    items: &'a [T],
    name_of: impl Fn(&T) -> &String,
    subject: impl Fn(String) -> Subject,
    diagnostics: &mut Diagnostics,
) -> Vec<(String, &'a T)> {
    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    for item in items {
        let name = name_of(item).trim().to_owned();
        if name.is_empty() {
            diagnostics.error(Kind::SchemaInvalid, subject(name), "name must not be empty");
            continue;
        }
        if !seen.insert(name.clone()) {
            diagnostics.warn(
                Kind::Ambiguous,
                subject(name),
                "duplicate name, only the first declaration is used",
            );
            continue;
        }
        result.push((name, item));
    }
    result
}

/// Keeps the first of items whose names mint the same component ID.
fn unique_ids<T>(
    items: Vec<T>,
    name_and_id: impl Fn(&T) -> (&String, &String),
    subject: impl Fn(String) -> Subject,
    diagnostics: &mut Diagnostics,
) -> Vec<T> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut result = Vec::new();
    for item in items {
        let (name, id) = name_and_id(&item);
        if let Some(first) = seen.get(id) {
            diagnostics.warn(
                Kind::Ambiguous,
                subject(name.clone()),
                format!("name maps to the component ID {id:?} of {first:?}, only the first declaration is used"),
            );
            continue;
        }
        seen.insert(id.clone(), name.clone());
        result.push(item);
    }
    result
}

fn parse_type<T: FromStr>(
    value: &str,
    what: &str,
    subject: &Subject,
    diagnostics: &mut Diagnostics,
) -> Option<T> {
    match value.trim() {
        "" => {
            diagnostics.error(
                Kind::SchemaInvalid,
                subject.clone(),
                format!("missing {what} type"),
            );
            None
        }
        value => match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                diagnostics.error(
                    Kind::SchemaInvalid,
                    subject.clone(),
                    format!("unknown {what} type: {value}"),
                );
                None
            }
        },
    }
}

/// Reports variant bodies which do not belong to the selected type.
fn check_bodies(
    selected: &str,
    populated: &[(&str, bool)],
    subject: &Subject,
    diagnostics: &mut Diagnostics,
) -> bool {
    let unexpected: Vec<&str> = populated
        .iter()
        .filter(|(name, set)| *set && *name != selected)
        .map(|(name, _)| *name)
        .collect();
    if unexpected.is_empty() {
        return true;
    }
    diagnostics.error(
        Kind::SchemaInvalid,
        subject.clone(),
        format!(
            "type {selected:?} does not allow the fields {}",
            unexpected.join(", ")
        ),
    );
    false
}

fn missing_body(selected: &str, subject: &Subject, diagnostics: &mut Diagnostics) {
    diagnostics.error(
        Kind::SchemaInvalid,
        subject.clone(),
        format!("type {selected:?} requires the field {selected:?}"),
    );
}

fn parse_sources<T: FromStr + IntoEnumIterator + Ord>(
    sources: &[String],
    subject: &Subject,
    diagnostics: &mut Diagnostics,
) -> Option<BTreeSet<T>> {
    if sources.is_empty() {
        return Some(T::iter().collect());
    }
    let mut parsed = BTreeSet::new();
    for source in sources {
        match source.parse() {
            Ok(source) => {
                parsed.insert(source);
            }
            Err(_) => {
                diagnostics.error(
                    Kind::EnumInvalid,
                    subject.clone(),
                    format!("unknown source: {source}"),
                );
                return None;
            }
        }
    }
    Some(parsed)
}

fn normalize_input(name: String, input: &InputSpec, diagnostics: &mut Diagnostics) -> Option<Input> {
    let subject = Subject::Input(name.clone());
    let input_type: InputType = parse_type(&input.input_type, "input", &subject, diagnostics)?;
    let bodies = [
        ("application", input.application.is_some()),
        ("infrastructure", input.infrastructure.is_some()),
        ("audit", input.audit.is_some()),
        ("receiver", input.receiver.is_some()),
    ];
    if !check_bodies(input_type.as_ref(), &bodies, &subject, diagnostics) {
        return None;
    }

    let kind = match input_type {
        InputType::Application => {
            let application = input.application.clone().unwrap_or_default();
            let limit = application
                .tuning
                .as_ref()
                .and_then(|t| t.rate_limit_per_container.as_ref());
            let max_records_per_second =
                rate_limit(limit, "rateLimitPerContainer", &subject, diagnostics)?;
            if let Some(requirement) = application
                .selector
                .iter()
                .flat_map(|s| &s.match_expressions)
                .find(|r| r.operator.parse::<SelectorOperator>().is_err())
            {
                diagnostics.error(
                    Kind::EnumInvalid,
                    subject,
                    format!("unknown label selector operator: {}", requirement.operator),
                );
                return None;
            }
            InputKind::Application {
                includes: application.includes,
                excludes: application.excludes,
                selector: application.selector,
                max_records_per_second,
            }
        }
        InputType::Infrastructure => {
            let sources = input
                .infrastructure
                .as_ref()
                .map(|i| i.sources.as_slice())
                .unwrap_or_default();
            InputKind::Infrastructure {
                sources: parse_sources(sources, &subject, diagnostics)?,
            }
        }
        InputType::Audit => {
            let sources = input
                .audit
                .as_ref()
                .map(|a| a.sources.as_slice())
                .unwrap_or_default();
            InputKind::Audit {
                sources: parse_sources(sources, &subject, diagnostics)?,
            }
        }
        InputType::Receiver => {
            let Some(receiver) = &input.receiver else {
                missing_body("receiver", &subject, diagnostics);
                return None;
            };
            let receiver_type: ReceiverType =
                parse_type(&receiver.receiver_type, "receiver", &subject, diagnostics)?;
            if receiver_type == ReceiverType::Http {
                let format = receiver.http.as_ref().and_then(|h| h.format.as_deref());
                if let Some(format) = format.filter(|f| *f != "kubeAPIAudit") {
                    diagnostics.error(
                        Kind::EnumInvalid,
                        subject,
                        format!("unsupported HTTP receiver format: {format}"),
                    );
                    return None;
                }
            }
            InputKind::Receiver {
                receiver_type,
                port: receiver
                    .port
                    .unwrap_or_else(|| receiver_type.default_port()),
            }
        }
    };

    Some(Input {
        id: ids::mint(Role::Input, &[&name]),
        name,
        kind,
    })
}

fn normalize_filter(
    name: String,
    filter: &FilterSpec,
    diagnostics: &mut Diagnostics,
) -> Option<Filter> {
    let subject = Subject::Filter(name.clone());
    let filter_type: FilterType = parse_type(&filter.filter_type, "filter", &subject, diagnostics)?;
    let bodies = [
        ("kubeAPIAudit", filter.kube_api_audit.is_some()),
        ("drop", filter.drop.is_some()),
        ("prune", filter.prune.is_some()),
        ("openshiftLabels", filter.openshift_labels.is_some()),
    ];
    if !check_bodies(filter_type.as_ref(), &bodies, &subject, diagnostics) {
        return None;
    }

    let kind = match filter_type {
        FilterType::KubeApiAudit => {
            FilterKind::KubeApiAudit(filter.kube_api_audit.clone().unwrap_or_default())
        }
        FilterType::Drop => match &filter.drop {
            Some(tests) if !tests.is_empty() => FilterKind::Drop(tests.clone()),
            _ => {
                missing_body("drop", &subject, diagnostics);
                return None;
            }
        },
        FilterType::Prune => match &filter.prune {
            Some(prune) if !(prune.in_.is_empty() && prune.not_in.is_empty()) => {
                FilterKind::Prune(prune.clone())
            }
            _ => {
                missing_body("prune", &subject, diagnostics);
                return None;
            }
        },
        FilterType::DetectMultilineException => FilterKind::DetectMultilineException,
        FilterType::Parse => FilterKind::Parse,
        FilterType::OpenshiftLabels => match &filter.openshift_labels {
            Some(labels) => FilterKind::OpenshiftLabels(labels.clone()),
            None => {
                missing_body("openshiftLabels", &subject, diagnostics);
                return None;
            }
        },
    };

    Some(Filter { name, kind })
}

pub(crate) fn normalize_output(
    name: String,
    output: &OutputSpec,
    diagnostics: &mut Diagnostics,
) -> Option<Output> {
    let subject = Subject::Output(name.clone());
    let output_type: OutputType = parse_type(&output.output_type, "output", &subject, diagnostics)?;
    let bodies = [
        ("azureMonitor", output.azure_monitor.is_some()),
        ("cloudwatch", output.cloudwatch.is_some()),
        ("elasticsearch", output.elasticsearch.is_some()),
        ("http", output.http.is_some()),
        ("kafka", output.kafka.is_some()),
        ("loki", output.loki.is_some()),
        ("otlp", output.otlp.is_some()),
        ("s3", output.s3.is_some()),
        ("splunk", output.splunk.is_some()),
        ("syslog", output.syslog.is_some()),
    ];
    if !check_bodies(output_type.as_ref(), &bodies, &subject, diagnostics) {
        return None;
    }

    let kind = match output_type {
        OutputType::AzureMonitor => output.azure_monitor.clone().map(OutputKind::AzureMonitor),
        OutputType::Cloudwatch => output.cloudwatch.clone().map(OutputKind::Cloudwatch),
        OutputType::Elasticsearch => output.elasticsearch.clone().map(OutputKind::Elasticsearch),
        OutputType::Http => output.http.clone().map(OutputKind::Http),
        OutputType::Kafka => output.kafka.clone().map(OutputKind::Kafka),
        OutputType::Loki => output.loki.clone().map(OutputKind::Loki),
        OutputType::Otlp => output.otlp.clone().map(OutputKind::Otlp),
        OutputType::S3 => output.s3.clone().map(OutputKind::S3),
        OutputType::Splunk => output.splunk.clone().map(OutputKind::Splunk),
        OutputType::Syslog => output.syslog.clone().map(OutputKind::Syslog),
    };
    let Some(kind) = kind else {
        missing_body(output_type.as_ref(), &subject, diagnostics);
        return None;
    };

    let max_records_per_second =
        rate_limit(output.rate_limit.as_ref(), "rateLimit", &subject, diagnostics)?;

    Some(Output {
        id: ids::mint(Role::Output, &[&name]),
        name,
        kind,
        tls: output.tls.clone(),
        max_records_per_second,
    })
}

/// Resolves the references of a pipeline against the already validated items.
fn resolve_refs(
    refs: &[String],
    what: &str,
    declared: impl Fn(&str) -> bool,
    valid: impl Fn(&str) -> bool,
    subject: &Subject,
    diagnostics: &mut Diagnostics,
) -> Vec<String> {
    let mut resolved = Vec::new();
    for reference in refs {
        let reference = reference.trim();
        if valid(reference) {
            resolved.push(reference.to_owned());
        } else if declared(reference) {
            diagnostics.error(
                Kind::ReferenceUnresolved,
                subject.clone(),
                format!("{what} {reference:?} is invalid and was left out"),
            );
        } else {
            diagnostics.error(
                Kind::ReferenceUnresolved,
                subject.clone(),
                format!("{what} {reference:?} is not declared"),
            );
        }
    }
    resolved
}

fn normalize_pipeline(
    name: String,
    pipeline: &PipelineSpec,
    spec: &crate::model::ForwarderSpec,
    forwarder: &Forwarder,
    diagnostics: &mut Diagnostics,
) -> Option<Pipeline> {
    let subject = Subject::Pipeline(name.clone());

    let mut input_refs = resolve_refs(
        &pipeline.input_refs,
        "input",
        |r| spec.inputs.iter().any(|i| i.name.trim() == r),
        |r| forwarder.input(r).is_some(),
        &subject,
        diagnostics,
    );
    dedup_keep_first(&mut input_refs);

    let filter_refs = resolve_refs(
        &pipeline.filter_refs,
        "filter",
        |r| spec.filters.iter().any(|f| f.name.trim() == r),
        |r| forwarder.filter(r).is_some(),
        &subject,
        diagnostics,
    );

    let mut output_refs = resolve_refs(
        &pipeline.output_refs,
        "output",
        |r| spec.outputs.iter().any(|o| o.name.trim() == r),
        |r| forwarder.output(r).is_some(),
        &subject,
        diagnostics,
    );
    dedup_keep_first(&mut output_refs);

    if input_refs.is_empty() || output_refs.is_empty() {
        diagnostics.error(
            Kind::SchemaInvalid,
            subject,
            "pipeline has no valid inputs or no valid outputs and was left out",
        );
        return None;
    }

    Some(Pipeline {
        name,
        input_refs,
        filter_refs,
        output_refs,
        labels: pipeline.labels.clone(),
    })
}

/// Fills in the default policy of a rate limit and checks its threshold.
///
/// A limit without `maxRecordsPerSecond` gets the default of no limit. Returns `None` for a
/// threshold that is not positive, `Some(None)` when records are not throttled.
fn rate_limit(
    limit: Option<&LimitSpec>,
    field: &str,
    subject: &Subject,
    diagnostics: &mut Diagnostics,
) -> Option<Option<i64>> {
    let Some(limit) = limit else {
        return Some(None);
    };
    match limit.max_records_per_second {
        None => {
            diagnostics.info(
                Kind::Note,
                subject.clone(),
                format!("{field} has no maxRecordsPerSecond, the default of no limit applies"),
            );
            Some(None)
        }
        Some(max) if max <= 0 => {
            diagnostics.error(
                Kind::SchemaInvalid,
                subject.clone(),
                format!("maxRecordsPerSecond must be positive, got {max}"),
            );
            None
        }
        Some(max) => Some(Some(max)),
    }
}

fn dedup_keep_first(refs: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    refs.retain(|r| seen.insert(r.clone()));
}

fn report_unreferenced(forwarder: &Forwarder, diagnostics: &mut Diagnostics) {
    let pipelines = &forwarder.pipelines;
    for input in &forwarder.inputs {
        if !pipelines.iter().any(|p| p.input_refs.contains(&input.name)) {
            diagnostics.info(Kind::Note, Subject::Input(input.name.clone()), "input is not used by any pipeline");
        }
    }
    for filter in &forwarder.filters {
        if !pipelines.iter().any(|p| p.filter_refs.contains(&filter.name)) {
            diagnostics.info(Kind::Note, Subject::Filter(filter.name.clone()), "filter is not used by any pipeline");
        }
    }
    for output in &forwarder.outputs {
        if !pipelines.iter().any(|p| p.output_refs.contains(&output.name)) {
            diagnostics.info(Kind::Note, Subject::Output(output.name.clone()), "output is not used by any pipeline");
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::diagnostics::Level;

    fn normalize_yaml(input: &str) -> (Forwarder, Diagnostics) {
        let forwarder = ClusterLogForwarder::from_yaml_str(input).expect("valid document");
        let mut diagnostics = Diagnostics::new();
        let secrets = SecretStore::new();
        let normalized = normalize(&forwarder, &secrets, &mut diagnostics);
        (normalized, diagnostics)
    }

    const OUTPUTS: &str = indoc! {"
        outputs:
          - name: es
            type: elasticsearch
            elasticsearch:
              url: https://es:9200
    "};

    #[rstest]
    #[case("", "missing filter type")]
    #[case("grep", "unknown filter type: grep")]
    fn reports_filter_types(#[case] filter_type: &str, #[case] message: &str) {
        let (forwarder, diagnostics) = normalize_yaml(&format!(
            "filters:\n  - name: f\n    type: {filter_type:?}\n"
        ));
        assert!(forwarder.filters.is_empty());
        let error = diagnostics.errors().next().expect("an error is reported");
        assert_eq!(error.kind, Kind::SchemaInvalid);
        assert_eq!(error.message, message);
    }

    #[test]
    fn expands_empty_sources() {
        let (forwarder, _) = normalize_yaml(indoc! {"
            inputs:
              - name: infra
                type: infrastructure
              - name: audit
                type: audit
                audit:
                  sources: []
              - name: ovn
                type: audit
                audit:
                  sources: [ovn]
        "});

        let sources: Vec<String> = forwarder
            .inputs
            .iter()
            .map(|input| match &input.kind {
                InputKind::Infrastructure { sources } => {
                    sources.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
                }
                InputKind::Audit { sources } => {
                    sources.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
                }
                _ => String::new(),
            })
            .collect();
        assert_eq!(
            sources,
            vec!["container,node", "auditd,kubeAPI,openshiftAPI,ovn", "ovn"]
        );
    }

    #[test]
    fn keeps_first_duplicate() {
        let (forwarder, diagnostics) = normalize_yaml(indoc! {"
            filters:
              - name: labels
                type: openshiftLabels
                openshiftLabels: {a: b}
              - name: ' labels '
                type: parse
        "});

        assert_eq!(forwarder.filters.len(), 1);
        assert!(matches!(forwarder.filters[0].kind, FilterKind::OpenshiftLabels(_)));
        let warning = diagnostics.warnings().next().expect("a warning is reported");
        assert_eq!(warning.kind, Kind::Ambiguous);
    }

    #[test]
    fn drops_colliding_ids() {
        let (forwarder, diagnostics) = normalize_yaml(indoc! {"
            inputs:
              - name: my-app
                type: application
              - name: my.app
                type: application
        "});

        assert_eq!(forwarder.inputs.len(), 1);
        assert_eq!(forwarder.inputs[0].id, "input_my_app");
        assert!(diagnostics.iter().any(|d| d.kind == Kind::Ambiguous));
    }

    #[test]
    fn rejects_mismatched_bodies() {
        let (forwarder, diagnostics) = normalize_yaml(indoc! {"
            outputs:
              - name: es
                type: elasticsearch
                loki:
                  url: https://loki:3100
              - name: kafka
                type: kafka
        "});

        assert!(forwarder.outputs.is_empty());
        let messages: Vec<&str> = diagnostics.errors().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "type \"elasticsearch\" does not allow the fields loki",
                "type \"kafka\" requires the field \"kafka\"",
            ]
        );
    }

    #[test]
    fn resolves_pipeline_references() {
        let (forwarder, diagnostics) = normalize_yaml(&format!(
            "{OUTPUTS}{}",
            indoc! {"
                inputs:
                  - name: app
                    type: application
                pipelines:
                  - inputRefs: [app, missing]
                    filterRefs: [nope]
                    outputRefs: [es, es]
                  - name: empty
                    inputRefs: [app]
                    outputRefs: [other]
            "}
        ));

        assert_eq!(forwarder.pipelines.len(), 1);
        let pipeline = &forwarder.pipelines[0];
        assert_eq!(pipeline.name, "pipeline_0");
        assert_eq!(pipeline.input_refs, vec!["app"]);
        assert!(pipeline.filter_refs.is_empty());
        assert_eq!(pipeline.output_refs, vec!["es"]);

        let unresolved = diagnostics
            .iter()
            .filter(|d| d.kind == Kind::ReferenceUnresolved)
            .count();
        assert_eq!(unresolved, 3);
        assert!(diagnostics.has_errors_for(&Subject::Pipeline("empty".to_owned())));
    }

    #[test]
    fn notes_partial_rate_limits_and_unused_items() {
        let (forwarder, diagnostics) = normalize_yaml(indoc! {"
            inputs:
              - name: app
                type: application
                application:
                  tuning:
                    rateLimitPerContainer: {}
        "});

        assert!(matches!(
            forwarder.inputs[0].kind,
            InputKind::Application { max_records_per_second: None, .. }
        ));
        let notes: Vec<&str> = diagnostics
            .iter()
            .filter(|d| d.level == Level::Info)
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            notes,
            vec![
                "rateLimitPerContainer has no maxRecordsPerSecond, the default of no limit applies",
                "input is not used by any pipeline",
            ]
        );
    }

    #[rstest]
    #[case("rateLimit: {}", None, false)]
    #[case("rateLimit: {maxRecordsPerSecond: 50}", Some(50), false)]
    #[case("rateLimit: {maxRecordsPerSecond: 0}", None, true)]
    fn fills_in_default_output_rate_limits(
        #[case] limit: &str,
        #[case] expected: Option<i64>,
        #[case] rejected: bool,
    ) {
        let (forwarder, diagnostics) = normalize_yaml(&format!(
            "
outputs:
  - name: out
    type: http
    http: {{url: https://out.example}}
    {limit}
"
        ));

        assert_eq!(forwarder.outputs.is_empty(), rejected);
        if let Some(output) = forwarder.outputs.first() {
            assert_eq!(output.max_records_per_second, expected);
        }
        let defaulted = diagnostics.iter().any(|d| {
            d.message == "rateLimit has no maxRecordsPerSecond, the default of no limit applies"
        });
        assert_eq!(defaulted, limit == "rateLimit: {}");
    }

    #[test]
    fn rejects_unknown_sources() {
        let (forwarder, diagnostics) = normalize_yaml(indoc! {"
            inputs:
              - name: infra
                type: infrastructure
                infrastructure:
                  sources: [container, kernel]
        "});

        assert!(forwarder.inputs.is_empty());
        let error = diagnostics.errors().next().expect("an error is reported");
        assert_eq!(error.kind, Kind::EnumInvalid);
        assert_eq!(error.message, "unknown source: kernel");
    }
}
