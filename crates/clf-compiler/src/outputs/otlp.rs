//! Renders OTLP/HTTP JSON sinks.
//!
//! Records are routed by their `log_source`, reshaped into OTLP log records carrying semantic
//! convention attributes and then reduced into batches sharing the same resource. The sink wraps
//! the array of resource logs into the `{"resourceLogs": [...]}` payload.

use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use super::{
    RenderContext, Result,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Table, Value},
    ids,
    model::OtlpSpec,
    template::vrl_string,
    vrl::{self, viaq::LogSource},
};

const COMPRESSIONS: [&str; 4] = ["gzip", "zlib", "zstd", "snappy"];

const LOG_RECORD: &str = r#"
r = {"attributes": []}
r.timeUnixNano = to_string(to_unix_timestamp(timestamp(."@timestamp") ?? parse_timestamp(to_string(."@timestamp") ?? "", format: "%+") ?? now(), unit: "nanoseconds"))
r.observedTimeUnixNano = to_string(to_unix_timestamp(now(), unit: "nanoseconds"))
r.severityNumber = to_syslog_severity(.level) ?? 9
"#;

const BODY_FROM_MESSAGE: &str = r#"
body = .message
if body == null { body = encode_json(._internal.structured) }
r.body = {"stringValue": to_string(body) ?? ""}
"#;

const BODY_FROM_RAW_EVENT: &str = r#"r.body = {"stringValue": to_string(._internal.message) ?? ""}"#;

const OPENSHIFT_LABELS: &str = r#"
if is_object(.openshift.labels) {
  for_each(object!(.openshift.labels)) -> |key, value| {
    r.attributes = push(r.attributes, {"key": "openshift.label." + key, "value": {"stringValue": to_string(value) ?? ""}})
  }
}
"#;

const POD_LABELS: &str = r#"
if is_object(.kubernetes.labels) {
  for_each(object!(.kubernetes.labels)) -> |key, value| {
    r.attributes = push(r.attributes, {"key": "k8s.pod.label." + key, "value": {"stringValue": to_string(value) ?? ""}})
  }
}
"#;

const SPLIT_REQUEST_URI: &str = r#"uri = split(to_string(.requestURI) ?? "", "?", limit: 2)"#;

const FORMAT_RESOURCE_LOGS: &str = r#"
. = {
  "resource": {"attributes": .resource.attributes},
  "scopeLogs": [{"logRecords": .logRecords}]
}
"#;

const BASE_RESOURCE_ATTRIBUTES: [(&str, &str); 3] = [
    ("k8s.cluster.uid", ".openshift.cluster_id"),
    ("openshift.log.source", ".log_source"),
    ("log_type", ".log_type"),
];

const CONTAINER_RESOURCE_ATTRIBUTES: [(&str, &str); 6] = [
    ("k8s.pod.name", ".kubernetes.pod_name"),
    ("k8s.container.name", ".kubernetes.container_name"),
    ("k8s.namespace.name", ".kubernetes.namespace_name"),
    ("kubernetes_pod_name", ".kubernetes.pod_name"),
    ("kubernetes_container_name", ".kubernetes.container_name"),
    ("kubernetes_namespace_name", ".kubernetes.namespace_name"),
];

const HOST_RESOURCE_ATTRIBUTES: [(&str, &str); 1] = [("k8s.node.name", ".hostname")];

const CONTAINER_LOG_ATTRIBUTES: [(&str, &str); 4] = [
    ("k8s.pod.uid", ".kubernetes.pod_id"),
    ("k8s.container.id", ".kubernetes.container_id"),
    ("k8s.node.name", ".hostname"),
    ("log.iostream", ".kubernetes.container_iostream"),
];

const NODE_LOG_ATTRIBUTES: [(&str, &str); 10] = [
    ("syslog.facility", ".systemd.u.SYSLOG_FACILITY"),
    ("service.name", ".systemd.u.SYSLOG_IDENTIFIER"),
    ("process.command", ".systemd.t.COMM"),
    ("process.command_line", ".systemd.t.CMDLINE"),
    ("process.executable.path", ".systemd.t.EXE"),
    ("process.gid", ".systemd.t.GID"),
    ("host.id", ".systemd.t.MACHINE_ID"),
    ("host.name", ".hostname"),
    ("process.pid", ".systemd.t.PID"),
    ("process.user.id", ".systemd.t.UID"),
];

const API_LOG_ATTRIBUTES: [(&str, &str); 7] = [
    ("http.response.status.code", ".responseStatus.code"),
    ("http.request.method_original", ".verb"),
    ("user.name", ".user.username"),
    ("user_agent.original", ".userAgent"),
    ("url.domain", ".hostname"),
    ("url.path", "uri[0]"),
    ("url.query", "uri[1]"),
];

/// The reduce transform a stream of records is batched by.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Group {
    Container,
    Source,
    Host,
}

impl Group {
    /// Syslog records have no OTLP mapping and are not routed.
    fn of(source: LogSource) -> Option<Self> {
        match source {
            LogSource::Container => Some(Self::Container),
            LogSource::KubeApi | LogSource::OpenshiftApi | LogSource::Ovn => Some(Self::Source),
            LogSource::Node | LogSource::Auditd => Some(Self::Host),
            LogSource::Syslog => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Container => "groupby_container",
            Self::Source => "groupby_source",
            Self::Host => "groupby_host",
        }
    }

    fn max_events(self) -> i64 {
        match self {
            Self::Container | Self::Source => 250,
            Self::Host => 50,
        }
    }

    fn group_by(self) -> &'static [&'static str] {
        match self {
            Self::Container => &[
                "openshift.cluster_id",
                "kubernetes.namespace_name",
                "kubernetes.pod_name",
                "kubernetes.container_name",
            ],
            Self::Source => &["openshift.cluster_id", "openshift.log_source"],
            Self::Host => &["openshift.cluster_id", "openshift.hostname"],
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Container => "Group records by cluster, namespace, pod and container",
            Self::Source => "Group records by cluster and log source",
            Self::Host => "Group records by cluster and host",
        }
    }

    fn reduce(self, id: String, inputs: Vec<String>) -> Component {
        Component::transform(id, "reduce", inputs)
            .with("max_events", self.max_events())
            .with("group_by", Value::strings(self.group_by().iter().copied()))
            .with_table(
                "merge_strategies",
                Table::new()
                    .with("resource", "retain")
                    .with("logRecords", "array"),
            )
            .describe(self.describe())
    }
}

/// Appends `{"key": ..., "value": {"stringValue": ...}}` entries to the array at `target`.
fn append_attributes(target: &str, attributes: &[(&str, &str)]) -> String {
    let entries = attributes
        .iter()
        .map(|(key, value)| {
            format!(
                r#"  {{"key": {key}, "value": {{"stringValue": to_string({value}) ?? ""}}}}"#,
                key = vrl_string(key)
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{target} = append({target}, [\n{entries}\n])")
}

/// Replaces the record with the fields the reduce transforms group by, the resource and the log
/// record.
fn grouping(source: LogSource) -> String {
    let kubernetes = if source == LogSource::Container {
        r#"
  "kubernetes": {
    "namespace_name": .kubernetes.namespace_name,
    "pod_name": .kubernetes.pod_name,
    "container_name": .kubernetes.container_name
  },"#
    } else {
        ""
    };
    format!(
        r#". = {{
  "openshift": {{
    "log_type": .log_type,
    "log_source": .log_source,
    "hostname": .hostname,
    "cluster_id": .openshift.cluster_id
  }},{kubernetes}
  "resource": resource,
  "logRecords": r
}}"#
    )
}

fn program(source: LogSource) -> String {
    let mut fragments = vec![
        r#"resource = {"attributes": []}"#.to_owned(),
        append_attributes("resource.attributes", &BASE_RESOURCE_ATTRIBUTES),
    ];
    match source {
        LogSource::Container => fragments.push(append_attributes(
            "resource.attributes",
            &CONTAINER_RESOURCE_ATTRIBUTES,
        )),
        LogSource::Auditd => {
            fragments.push(append_attributes("resource.attributes", &HOST_RESOURCE_ATTRIBUTES));
        }
        _ => {}
    }

    fragments.push(LOG_RECORD.to_owned());
    fragments.push(
        match source {
            LogSource::Auditd | LogSource::KubeApi | LogSource::OpenshiftApi => BODY_FROM_RAW_EVENT,
            _ => BODY_FROM_MESSAGE,
        }
        .to_owned(),
    );
    fragments.push(append_attributes(
        "r.attributes",
        &[("openshift.log.type", ".log_type")],
    ));
    fragments.push(OPENSHIFT_LABELS.to_owned());
    match source {
        LogSource::Container => {
            fragments.push(append_attributes("r.attributes", &CONTAINER_LOG_ATTRIBUTES));
            fragments.push(POD_LABELS.to_owned());
        }
        LogSource::Node => fragments.push(append_attributes("r.attributes", &NODE_LOG_ATTRIBUTES)),
        LogSource::KubeApi | LogSource::OpenshiftApi => {
            fragments.push(SPLIT_REQUEST_URI.to_owned());
            fragments.push(append_attributes("r.attributes", &API_LOG_ATTRIBUTES));
        }
        _ => {}
    }
    fragments.push(grouping(source));
    vrl::join(fragments)
}

fn describe(source: LogSource) -> &'static str {
    match source {
        LogSource::Container => "Normalize container records to OTLP semantic conventions",
        LogSource::Node => "Normalize node records to OTLP semantic conventions",
        LogSource::Auditd => "Normalize auditd records to OTLP semantic conventions",
        LogSource::KubeApi => "Normalize Kubernetes API audit records to OTLP semantic conventions",
        LogSource::OpenshiftApi => "Normalize OpenShift API audit records to OTLP semantic conventions",
        LogSource::Ovn => "Normalize OVN audit records to OTLP semantic conventions",
        LogSource::Syslog => "",
    }
}

/// The name of the route a source is sent to, also used for its transform.
fn route_name(source: LogSource) -> String {
    source.as_ref().to_lowercase()
}

pub fn build(spec: &OtlpSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let url = common::parse_url(&spec.url, &HTTP_SCHEMES)?;

    let reroute_id = ids::child(context.id, "reroute");
    let routed: Vec<(LogSource, Group)> = LogSource::iter()
        .filter_map(|source| Group::of(source).map(|group| (source, group)))
        .collect();
    let routes = routed.iter().fold(Table::new(), |table, (source, _)| {
        table.with(
            route_name(*source),
            format!(".log_source == {}", vrl_string(source.as_ref())),
        )
    });
    let mut components = vec![
        Component::transform(&reroute_id, "route", context.inputs.clone())
            .with_table("route", routes)
            .describe("Route records by log source"),
    ];

    let mut groups: BTreeMap<Group, Vec<String>> = BTreeMap::new();
    for (source, group) in routed {
        let name = route_name(source);
        let id = ids::child(context.id, &name);
        components.push(
            Component::remap(&id, vec![ids::route(&reroute_id, &name)], program(source))
                .describe(describe(source)),
        );
        groups.entry(group).or_default().push(id);
    }

    let mut reduced = Vec::new();
    for (group, inputs) in groups {
        let id = ids::child(context.id, group.suffix());
        components.push(group.reduce(id.clone(), inputs));
        reduced.push(id);
    }

    let resource_logs_id = ids::child(context.id, "resource_logs");
    components.push(
        Component::remap(&resource_logs_id, reduced, FORMAT_RESOURCE_LOGS.trim())
            .describe("Create the resource logs of the OTLP payload"),
    );

    let sink = Component::sink(context.id, "opentelemetry", vec![resource_logs_id])
        .with("uri", &spec.url)
        .with("method", "post")
        .with("payload_prefix", r#"{"resourceLogs":"#)
        .with("payload_suffix", "}")
        .with_table("encoding", Table::new().with("codec", "json"))
        .with_table("auth", common::http_auth(spec.authentication.as_ref())?);
    let mut sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &Capabilities::http(&COMPRESSIONS),
        common::is_secure(&url),
        context.tls,
        context.options,
    )?;

    // Everything but the buffer belongs to the HTTP protocol of the sink.
    let mut protocol = std::mem::take(&mut sink.table);
    for name in ["buffer", "acknowledgements"] {
        if let Some(table) = protocol.remove_table(name) {
            sink.table.insert_table(name, table);
        }
    }
    sink.table.insert_table("protocol", protocol);
    components.push(sink);

    tracing::trace!(output.id = %context.id, url = %url, "routed OTLP output by log source");
    Ok(components)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::{
        diagnostics::Kind,
        options::CompileOptions,
        outputs::tests::{output, render_output},
    };

    const OTLP_OUTPUT: &str = indoc! {"
        name: otel
        type: otlp
        otlp:
          url: https://collector:4318/v1/logs
          authentication:
            token: {secretName: otel, key: token}
          tuning:
            deliveryMode: atLeastOnce
            compression: gzip
    "};

    #[test]
    fn groups_records_by_source() {
        let output = output(OTLP_OUTPUT);
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        let ids: Vec<&str> = config.components().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "output_otel_reroute",
                "output_otel_container",
                "output_otel_node",
                "output_otel_auditd",
                "output_otel_kubeapi",
                "output_otel_openshiftapi",
                "output_otel_ovn",
                "output_otel_groupby_container",
                "output_otel_groupby_source",
                "output_otel_groupby_host",
                "output_otel_resource_logs",
                "output_otel",
            ]
        );

        let reroute = config.component("output_otel_reroute").expect("route exists");
        assert_eq!(reroute.inputs, ["pipeline_p_viaq_0"]);
        let routes = reroute.table.table("route").expect("routes are set");
        assert_eq!(
            routes.get("kubeapi"),
            Some(&Value::from(r#".log_source == "kubeAPI""#))
        );
        assert!(routes.get("syslog").is_none());

        let kube = config.component("output_otel_kubeapi").expect("remap exists");
        assert_eq!(kube.inputs, ["output_otel_reroute.kubeapi"]);

        let by_source = config.component("output_otel_groupby_source").expect("reduce exists");
        assert_eq!(
            by_source.inputs,
            ["output_otel_kubeapi", "output_otel_openshiftapi", "output_otel_ovn"]
        );
        assert_eq!(by_source.table.get("max_events"), Some(&Value::Integer(250)));
        let by_host = config.component("output_otel_groupby_host").expect("reduce exists");
        assert_eq!(by_host.inputs, ["output_otel_node", "output_otel_auditd"]);
        assert_eq!(by_host.table.get("max_events"), Some(&Value::Integer(50)));
        assert_eq!(
            by_host.table.get("group_by"),
            Some(&Value::strings(["openshift.cluster_id", "openshift.hostname"]))
        );
        assert_eq!(
            by_host
                .table
                .table("merge_strategies")
                .and_then(|m| m.get("logRecords")),
            Some(&Value::from("array"))
        );

        let format = config.component("output_otel_resource_logs").expect("remap exists");
        assert_eq!(
            format.inputs,
            [
                "output_otel_groupby_container",
                "output_otel_groupby_source",
                "output_otel_groupby_host"
            ]
        );

        for program in config.components().iter().filter_map(Component::vrl) {
            assert_eq!(vrl::check(program), Ok(()), "{program}");
        }
    }

    #[test]
    fn maps_container_records() {
        let program = program(LogSource::Container);

        assert!(program.starts_with(indoc! {r#"
            resource = {"attributes": []}
            resource.attributes = append(resource.attributes, [
              {"key": "k8s.cluster.uid", "value": {"stringValue": to_string(.openshift.cluster_id) ?? ""}},"#}));
        assert!(program.contains(r#"r.severityNumber = to_syslog_severity(.level) ?? 9"#));
        assert!(program.contains(r#""k8s.pod.label." + key"#));
        assert!(program.contains(r#"  "kubernetes": {"#));
        assert!(!program.contains("uri = split"));
    }

    #[test]
    fn maps_api_audit_records() {
        let program = program(LogSource::OpenshiftApi);

        assert!(program.contains(BODY_FROM_RAW_EVENT));
        assert!(program.contains(
            r#"  {"key": "url.query", "value": {"stringValue": to_string(uri[1]) ?? ""}}"#
        ));
        assert!(!program.contains(r#""kubernetes": {"#));
    }

    #[test]
    fn nests_transport_settings_in_the_protocol() {
        let output = output(OTLP_OUTPUT);
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");
        let sink = config.component("output_otel").expect("sink exists");

        assert_eq!(sink.component_type, "opentelemetry");
        assert_eq!(sink.inputs, ["output_otel_resource_logs"]);
        assert!(sink.table.table("buffer").is_some());
        assert!(sink.table.table("acknowledgements").is_some());

        let protocol = sink.table.table("protocol").expect("protocol is set");
        assert_eq!(
            protocol.get("uri"),
            Some(&Value::from("https://collector:4318/v1/logs"))
        );
        assert_eq!(protocol.get("method"), Some(&Value::from("post")));
        assert_eq!(
            protocol.get("payload_prefix"),
            Some(&Value::from(r#"{"resourceLogs":"#))
        );
        assert_eq!(protocol.get("payload_suffix"), Some(&Value::from("}")));
        assert_eq!(protocol.get("compression"), Some(&Value::from("gzip")));
        assert_eq!(
            protocol.table("auth").and_then(|auth| auth.get("strategy")),
            Some(&Value::from("bearer"))
        );
        assert!(protocol.table("buffer").is_none());
    }

    #[rstest]
    #[case("url: ftp://collector/v1/logs", Kind::SchemaInvalid)]
    #[case("url: http://collector/v1/logs\n  tuning: {compression: lz4}", Kind::EnumInvalid)]
    fn rejects_invalid_specs(#[case] body: &str, #[case] kind: Kind) {
        let output = output(&format!("name: otel\ntype: otlp\notlp:\n  {body}\n"));
        let error = render_output(&output, &CompileOptions::default()).expect_err("spec is invalid");
        assert_eq!(error.kind(), kind);
    }
}
