//! Collector sources and the remaps normalizing their records below `._internal`.

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;

use crate::{
    config::{Component, Table, Value},
    constants::{
        CONTAINER_LOGS_DIR, HOST_AUDIT_LOG, JOURNAL_DIR, KUBE_API_AUDIT_LOG,
        OPENSHIFT_API_AUDIT_LOGS, OPENSHIFT_LOGGING_NAMESPACE, OVN_AUDIT_LOG, RECEIVER_CERTS_DIR,
    },
    ids::{self, InputComponent},
    model::{
        AuditSource, InfrastructureSource, LabelSelector, NamespaceContainerSpec, ReceiverType,
        SelectorOperator,
    },
    normalize::{Input, InputKind},
    options::CompileOptions,
    vrl::{self, audit, journal, viaq::LogSource},
};

static CONSECUTIVE_WILDCARDS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*+").expect("failed to compile wildcard regex"));

/// Namespaces whose containers are infrastructure.
pub const INFRA_NAMESPACES: [&str; 5] = ["default", "openshift", "openshift-*", "kube", "kube-*"];

const EXCLUDED_EXTENSIONS: [&str; 3] = ["gz", "tmp", "log.*"];

/// Workloads of the logging stack itself, never collected as infrastructure logs.
const LOGGING_POD_PREFIXES: [&str; 3] = ["logfilesmetricexporter", "elasticsearch", "kibana"];
const LOGGING_CONTAINERS: [&str; 3] = ["loki*", "gateway", "opa"];

/// Collapses runs of `*` into one.
fn collapse_wildcards(glob: &str) -> String {
    CONSECUTIVE_WILDCARDS_REGEX
        .replace_all(glob, "*")
        .into_owned()
}

/// Turns a namespace glob into the pod directory glob `<namespace>_*`.
fn namespace_glob(namespace: &str) -> String {
    if namespace == "*" {
        return namespace.to_owned();
    }
    format!("{}_*", collapse_wildcards(namespace))
}

/// Builds glob patterns below the pod log directory, laid out as
/// `<namespace>_<pod>_<uid>/<container>/<n>.log`.
#[derive(Debug, Default)]
struct ContainerPathGlobs {
    namespaces: BTreeSet<String>,
    combined: BTreeSet<String>,
    paths: BTreeSet<String>,
}

impl ContainerPathGlobs {
    fn namespaces<S: AsRef<str>>(mut self, namespaces: &[S]) -> Self {
        for namespace in namespaces {
            let namespace = namespace.as_ref();
            if !namespace.is_empty() {
                self.namespaces.insert(namespace_glob(namespace));
            }
        }
        self
    }

    fn combined<'a>(mut self, specs: impl IntoIterator<Item = &'a NamespaceContainerSpec>) -> Self {
        for spec in specs {
            let namespace = spec.namespace.as_deref().filter(|n| !n.is_empty()).unwrap_or("*");
            let container = spec.container.as_deref().filter(|c| !c.is_empty()).unwrap_or("*");
            self.combined.insert(format!(
                "{}/{}",
                namespace_glob(namespace),
                collapse_wildcards(container)
            ));
        }
        self
    }

    /// Adds a glob relative to the pod log directory.
    fn other(mut self, glob: &str) -> Self {
        self.paths
            .insert(format!("{CONTAINER_LOGS_DIR}/{}", collapse_wildcards(glob)));
        self
    }

    fn extensions(mut self) -> Self {
        for extension in EXCLUDED_EXTENSIONS {
            self.paths.insert(format!("{CONTAINER_LOGS_DIR}/*/*/*.{extension}"));
        }
        self
    }

    /// The sorted globs. Globs matching every container log yield an empty list.
    fn build(self) -> Vec<String> {
        let mut paths = self.paths;
        paths.extend(
            self.combined
                .iter()
                .map(|combined| format!("{CONTAINER_LOGS_DIR}/{combined}/*.log")),
        );
        paths.extend(
            self.namespaces
                .iter()
                .map(|namespace| format!("{CONTAINER_LOGS_DIR}/{namespace}/*/*.log")),
        );
        let everything = format!("{CONTAINER_LOGS_DIR}/*/*/*.log");
        if paths.len() == 1 && paths.contains(&everything) {
            return Vec::new();
        }
        paths.into_iter().collect()
    }
}

/// Infrastructure namespaces still excluded from an application input, given the namespaces it
/// explicitly includes.
fn pruned_infra_namespaces(includes: &[NamespaceContainerSpec]) -> Vec<&'static str> {
    let mut remaining: BTreeSet<&'static str> = INFRA_NAMESPACES.into_iter().collect();
    for namespace in includes.iter().filter_map(|i| i.namespace.as_deref()) {
        let removed: &[&str] = match namespace {
            "default" => &["default"],
            "openshift" => &["openshift"],
            "openshift*" => &["openshift", "openshift-*"],
            "kube" => &["kube"],
            "kube*" => &["kube", "kube-*"],
            ns if ns.len() > "openshift-".len() && ns.starts_with("openshift-") => &["openshift-*"],
            ns if ns.len() > "kube-".len() && ns.starts_with("kube-") => &["kube-*"],
            _ => &[],
        };
        for ns in removed {
            remaining.remove(ns);
        }
    }
    remaining.into_iter().collect()
}

/// Renders a label selector in the syntax of `extra_label_selector`.
pub fn label_selector(selector: &LabelSelector) -> Option<String> {
    let mut terms: Vec<String> = selector
        .match_labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    for requirement in &selector.match_expressions {
        let key = &requirement.key;
        let values = requirement.values.join(",");
        let term = match requirement.operator.parse::<SelectorOperator>() {
            Ok(SelectorOperator::In) => format!("{key} in ({values})"),
            Ok(SelectorOperator::NotIn) => format!("{key} notin ({values})"),
            Ok(SelectorOperator::Exists) => key.clone(),
            Ok(SelectorOperator::DoesNotExist) => format!("!{key}"),
            Err(_) => {
                tracing::warn!(operator = %requirement.operator, "skipping unknown selector operator");
                continue;
            }
        };
        terms.push(term);
    }
    (!terms.is_empty()).then(|| terms.join(","))
}

/// The components collecting the records of one input.
#[derive(Clone, Debug, Default)]
pub struct InputSource {
    pub components: Vec<Component>,

    /// The log sources records of this input can carry.
    pub log_sources: BTreeSet<LogSource>,

    ids: Vec<String>,
}

impl InputComponent for InputSource {
    fn input_ids(&self) -> Vec<String> {
        self.ids.clone()
    }
}

impl InputSource {
    /// Adds a source followed by the remap normalizing its records and exposes the remap.
    fn add(&mut self, source: Component, log_source: LogSource, vrl: String) {
        let remap_id = ids::child(&source.id, "meta");
        let remap = Component::remap(&remap_id, vec![source.id.clone()], vrl)
            .describe(format!("Normalize {log_source} records"));
        self.components.push(source);
        self.components.push(remap);
        self.log_sources.insert(log_source);
        self.ids.push(remap_id);
    }

    fn throttle(&mut self, base: &str, threshold: i64) {
        let Some(upstream) = self.ids.pop() else {
            return;
        };
        let id = ids::child(base, "throttle");
        self.components.push(
            Component::transform(&id, "throttle", vec![upstream])
                .with("threshold", threshold)
                .with("window_secs", 1i64)
                .with(
                    "key_field",
                    "{{ _internal.kubernetes.namespace_name }}{{ _internal.kubernetes.pod_name }}{{ _internal.kubernetes.container_name }}",
                ),
        );
        self.ids.push(id);
    }
}

fn kubernetes_logs(id: &str, includes: &[String], excludes: &[String]) -> Component {
    let mut source = Component::source(id, "kubernetes_logs")
        .describe("Logs from containers")
        .with("max_read_bytes", 3_145_728i64)
        .with("glob_minimum_cooldown_ms", 15_000i64)
        .with("auto_partial_merge", true)
        .with("rotate_wait_ms", 5_000i64)
        .with("use_apiserver_cache", true)
        .with_table(
            "pod_annotation_fields",
            Table::new()
                .with("pod_labels", "kubernetes.labels")
                .with("pod_namespace", "kubernetes.namespace_name")
                .with("pod_annotations", "kubernetes.annotations")
                .with("pod_uid", "kubernetes.pod_id")
                .with("pod_node_name", "hostname"),
        )
        .with_table(
            "namespace_annotation_fields",
            Table::new().with("namespace_uid", "kubernetes.namespace_id"),
        );
    if !includes.is_empty() {
        source = source.with("include_paths_glob_patterns", Value::strings(includes));
    }
    if !excludes.is_empty() {
        source = source.with("exclude_paths_glob_patterns", Value::strings(excludes));
    }
    source
}

fn file_source(id: &str, paths: &[&str]) -> Component {
    Component::source(id, "file")
        .with("include", Value::strings(paths.iter().copied()))
        .with("host_key", "hostname")
        .with("glob_minimum_cooldown_ms", 15_000i64)
}

fn receiver_tls(id: &str, options: &CompileOptions) -> Table {
    let mut tls = Table::new()
        .with("enabled", true)
        .with("key_file", format!("{RECEIVER_CERTS_DIR}/{id}/tls.key"))
        .with("crt_file", format!("{RECEIVER_CERTS_DIR}/{id}/tls.crt"));
    if let Some(version) = options
        .tls_profile_min_version
        .as_deref()
        .filter(|v| !v.is_empty())
    {
        tls.insert("min_tls_version", version);
    }
    if !options.tls_profile_ciphers.is_empty() {
        tls.insert("ciphersuites", options.tls_profile_ciphers.join(","));
    }
    tls
}

fn container_source(
    sources: &mut InputSource,
    input: &Input,
    includes: &[String],
    excludes: &[String],
    selector: Option<&LabelSelector>,
    options: &CompileOptions,
) {
    let base = ids::child(&input.id, "container");
    let mut source = kubernetes_logs(&base, includes, excludes);
    if let Some(selector) = selector.and_then(label_selector) {
        source = source.with("extra_label_selector", selector);
    }
    sources.add(
        source,
        LogSource::Container,
        vrl::viaq::container(options.node_name_env()),
    );
}

/// Builds the sources of an input.
pub fn build(input: &Input, options: &CompileOptions) -> InputSource {
    let env = options.node_name_env();
    let mut sources = InputSource::default();

    match &input.kind {
        InputKind::Application {
            includes,
            excludes,
            selector,
            max_records_per_second,
        } => {
            let include_globs = ContainerPathGlobs::default().combined(includes).build();
            let pruned: Vec<NamespaceContainerSpec> = pruned_infra_namespaces(includes)
                .into_iter()
                .map(|namespace| NamespaceContainerSpec {
                    namespace: Some(namespace.to_owned()),
                    container: None,
                })
                .collect();
            let exclude_globs = ContainerPathGlobs::default()
                .combined(&pruned)
                .combined(excludes)
                .extensions()
                .build();
            container_source(
                &mut sources,
                input,
                &include_globs,
                &exclude_globs,
                selector.as_ref(),
                options,
            );
            if let Some(threshold) = max_records_per_second {
                sources.throttle(&ids::child(&input.id, "container"), *threshold);
            }
        }
        InputKind::Infrastructure { sources: infra } => {
            if infra.contains(&InfrastructureSource::Container) {
                let include_globs = ContainerPathGlobs::default()
                    .namespaces(&INFRA_NAMESPACES)
                    .build();
                let mut excludes = ContainerPathGlobs::default();
                for prefix in LOGGING_POD_PREFIXES {
                    excludes = excludes.other(&format!("{OPENSHIFT_LOGGING_NAMESPACE}_{prefix}-*/*/*.log"));
                }
                for container in LOGGING_CONTAINERS {
                    excludes = excludes.other(&format!("{OPENSHIFT_LOGGING_NAMESPACE}_*/{container}/*.log"));
                }
                let exclude_globs = excludes.extensions().build();
                container_source(&mut sources, input, &include_globs, &exclude_globs, None, options);
            }
            if infra.contains(&InfrastructureSource::Node) {
                let id = ids::child(&input.id, "journal");
                sources.add(
                    Component::source(&id, "journald")
                        .describe("Logs from the linux journal")
                        .with("journal_directory", JOURNAL_DIR),
                    LogSource::Node,
                    journal::normalize(env),
                );
            }
        }
        InputKind::Audit { sources: audit_sources } => {
            for source in audit_sources {
                let (suffix, paths, log_source, vrl): (&str, Vec<&str>, _, _) = match source {
                    AuditSource::Auditd => (
                        "auditd",
                        vec![HOST_AUDIT_LOG],
                        LogSource::Auditd,
                        audit::host(env),
                    ),
                    AuditSource::KubeApi => (
                        "kubeapi",
                        vec![KUBE_API_AUDIT_LOG],
                        LogSource::KubeApi,
                        audit::api_server(LogSource::KubeApi, env),
                    ),
                    AuditSource::OpenshiftApi => (
                        "openshiftapi",
                        OPENSHIFT_API_AUDIT_LOGS.to_vec(),
                        LogSource::OpenshiftApi,
                        audit::api_server(LogSource::OpenshiftApi, env),
                    ),
                    AuditSource::Ovn => (
                        "ovn",
                        vec![OVN_AUDIT_LOG],
                        LogSource::Ovn,
                        audit::ovn(env),
                    ),
                };
                let id = ids::child(&input.id, suffix);
                sources.add(
                    file_source(&id, &paths).describe(format!("Logs from {source} audit")),
                    log_source,
                    vrl,
                );
            }
        }
        InputKind::Receiver {
            receiver_type: ReceiverType::Http,
            port,
        } => {
            let id = input.id.clone();
            let split_id = ids::child(&id, "split");
            let items_id = ids::child(&id, "items");
            sources.components.push(
                Component::source(&id, "http_server")
                    .describe("Audit events posted by the API server")
                    .with("address", format!("0.0.0.0:{port}"))
                    .with_table("decoding", Table::new().with("codec", "json"))
                    .with_table("tls", receiver_tls(&id, options)),
            );
            sources.components.push(Component::remap(
                &split_id,
                vec![id.clone()],
                "if exists(.items) && is_array(.items) { . = unnest!(.items) } else { . }",
            ));
            sources.components.push(Component::remap(
                &items_id,
                vec![split_id],
                "if exists(.items) { . = .items } else { . }",
            ));
            let remap_id = ids::child(&id, "meta");
            sources.components.push(
                Component::remap(&remap_id, vec![items_id], audit::received_event(env))
                    .describe("Normalize kubeAPI records"),
            );
            sources.log_sources.insert(LogSource::KubeApi);
            sources.ids.push(remap_id);
        }
        InputKind::Receiver {
            receiver_type: ReceiverType::Syslog,
            port,
        } => {
            let id = input.id.clone();
            sources.add(
                Component::source(&id, "syslog")
                    .describe("Records sent by syslog clients")
                    .with("address", format!("0.0.0.0:{port}"))
                    .with("mode", "tcp")
                    .with_table("tls", receiver_tls(&id, options)),
                LogSource::Syslog,
                audit::syslog(env),
            );
        }
    }

    tracing::debug!(
        input.name = %input.name,
        components = sources.components.len(),
        "built input sources"
    );
    sources
}
