//! The ViaQ record schema.
//!
//! Inputs move every raw record below `._internal` and normalize it there, so filters of a
//! pipeline see one shape regardless of the source. The pipeline tail ([`project`]) then builds
//! the public record next to the scratch subtree, which sinks leave out when encoding.

use std::collections::{BTreeMap, BTreeSet};

use strum::{AsRefStr, Display, EnumIter};

use super::{join, when};
use crate::template::vrl_string;

/// The `.log_type` of a record.
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "lowercase")]
pub enum LogType {
    Application,
    Infrastructure,
    Audit,
}

/// The `.log_source` of a record.
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LogSource {
    #[strum(serialize = "container")]
    Container,

    #[strum(serialize = "node")]
    Node,

    #[strum(serialize = "auditd")]
    Auditd,

    #[strum(serialize = "kubeAPI")]
    KubeApi,

    #[strum(serialize = "openshiftAPI")]
    OpenshiftApi,

    #[strum(serialize = "ovn")]
    Ovn,

    #[strum(serialize = "syslog")]
    Syslog,
}

impl LogSource {
    /// The `.log_source == "..."` condition selecting records of this source.
    pub fn condition(&self) -> String {
        format!("._internal.log_source == {}", vrl_string(self.as_ref()))
    }
}

pub const INTERNALIZE: &str = r#". = {"_internal": .}"#;

pub const LOG_TYPE_BY_NAMESPACE: &str = r#"
# If namespace is infra, label log_type as infra
if match_any(string!(._internal.kubernetes.namespace_name), [r'^default$', r'^openshift(-.+)?$', r'^kube(-.+)?$']) {
  ._internal.log_type = "infrastructure"
} else {
  ._internal.log_type = "application"
}
"#;

pub const HANDLE_EVENT_ROUTER_LOG: &str = r#"
if exists(._internal.kubernetes.pod_name) && starts_with(string!(._internal.kubernetes.pod_name), "eventrouter-") {
  parsed, err = parse_json(._internal.message)
  if err != null {
    log("Unable to process EventRouter log: " + err, level: "info")
  } else {
    ._internal.event = parsed
    if exists(._internal.event.event) && is_object(._internal.event.event) {
      ._internal.kubernetes.event = del(._internal.event.event)
      ._internal.kubernetes.event.verb = ._internal.event.verb
      ._internal.message = del(._internal.kubernetes.event.message)
      ._internal.timestamp = ._internal.kubernetes.event.metadata.creationTimestamp
    } else {
      log("Unable to merge EventRouter log message into record", level: "info")
    }
  }
}
"#;

pub const SET_LOG_LEVEL: &str = r#"
if !exists(._internal.level) {
  level = null
  message = ._internal.message

  # attempt 1: parse as logfmt (e.g. level=error msg="Failed to connect")
  parsed_logfmt, err = parse_logfmt(message)
  if err == null && is_string(parsed_logfmt.level) {
    level = downcase!(parsed_logfmt.level)
  }

  # attempt 2: parse as klog (e.g. I0920 14:22:00.089385 1 scheduler.go:592] "Successfully bound pod to node")
  if level == null {
    parsed_klog, err = parse_klog(message)
    if err == null && is_string(parsed_klog.level) {
      level = parsed_klog.level
    }
  }

  # attempt 3: parse classic text logs like Logback or Log4j
  if level == null {
    parsed_grok, err = parse_groks(message,
      patterns: [
        "%{common_prefix} %{_message}"
      ],
      aliases: {
        "common_prefix": "%{_timestamp} %{_loglevel}",
        "_timestamp": "%{TIMESTAMP_ISO8601:timestamp}",
        "_loglevel": "%{LOGLEVEL:level}",
        "_message": "%{GREEDYDATA:message}"
      }
    )
    if err == null && is_string(parsed_grok.level) {
      level = downcase!(parsed_grok.level)
    }
  }

  if level == null {
    level = "default"

    # attempt 4: match on well known structured patterns
    # Order: emergency, alert, critical, error, warn, notice, info, debug, trace
    if match!(message, r'^EM[0-9]+|level=emergency|Value:emergency|"level":"emergency"') {
      level = "emergency"
    } else if match!(message, r'^A[0-9]+|level=alert|Value:alert|"level":"alert"') {
      level = "alert"
    } else if match!(message, r'^C[0-9]+|level=critical|Value:critical|"level":"critical"') {
      level = "critical"
    } else if match!(message, r'^E[0-9]+|level=error|Value:error|"level":"error"') {
      level = "error"
    } else if match!(message, r'^W[0-9]+|level=warn|Value:warn|"level":"warn"') {
      level = "warn"
    } else if match!(message, r'^N[0-9]+|level=notice|Value:notice|"level":"notice"') {
      level = "notice"
    } else if match!(message, r'^I[0-9]+|level=info|Value:info|"level":"info"') {
      level = "info"
    } else if match!(message, r'^D[0-9]+|level=debug|Value:debug|"level":"debug"') {
      level = "debug"
    } else if match!(message, r'^T[0-9]+|level=trace|Value:trace|"level":"trace"') {
      level = "trace"
    }

    # attempt 5: match on the keyword that appears earliest in the message
    if level == "default" {
      level_patterns = r'(?i)(?<emergency>emergency|<emergency>)|(?<alert>alert|<alert>)|(?<critical>critical|<critical>)|(?<error>error|<error>)|(?<warn>warn(?:ing)?|<warn>)|(?<notice>notice|<notice>)|(?:\b(?<info>info)\b|<info>)|(?<debug>debug|<debug>)|(?<trace>trace|<trace>)'
      parsed, err = parse_regex(message, level_patterns)
      if err == null {
        if is_string(parsed.emergency) {
          level = "emergency"
        } else if is_string(parsed.alert) {
          level = "alert"
        } else if is_string(parsed.critical) {
          level = "critical"
        } else if is_string(parsed.error) {
          level = "error"
        } else if is_string(parsed.warn) {
          level = "warn"
        } else if is_string(parsed.notice) {
          level = "notice"
        } else if is_string(parsed.info) {
          level = "info"
        } else if is_string(parsed.debug) {
          level = "debug"
        } else if is_string(parsed.trace) {
          level = "trace"
        }
      }
    }
  }
  ._internal.level = level
}
"#;

pub const MERGE_STRUCTURED_INTO_ROOT: &str = r#"
if ._internal.log_type == "audit" && exists(._internal.structured) {. = merge!(., ._internal.structured) }
if ._internal.log_source == "syslog" && exists(._internal.structured) {. = merge!(., ._internal.structured) }
if ._internal.log_source == "container" && exists(._internal.structured) {.structured = ._internal.structured }
"#;

pub const DEDOT_KUBERNETES_LABELS: &str = r#"
if exists(._internal.kubernetes.namespace_labels) {
  ._internal.dedot_namespace_labels = map_keys(object!(._internal.kubernetes.namespace_labels)) -> |key| { replace(key, r'[\./]', "_") }
}
if exists(._internal.kubernetes.labels) {
  ._internal.dedot_labels = map_keys(object!(._internal.kubernetes.labels)) -> |key| { replace(key, r'[\./]', "_") }
}
"#;

pub const DEDOT_OPENSHIFT_LABELS: &str = r#"
if exists(._internal.openshift.labels) {
  ._internal.dedot_openshift_labels = map_keys(object!(._internal.openshift.labels)) -> |key| { replace(key, r'[\./]', "_") }
}
"#;

pub const SET_KUBERNETES_ON_ROOT: &str = r"
if exists(._internal.kubernetes) {
  .kubernetes = ._internal.kubernetes
  if exists(._internal.stream) { .kubernetes.container_iostream = ._internal.stream }
  if exists(._internal.dedot_labels) {.kubernetes.labels = del(._internal.dedot_labels) }
  if exists(._internal.dedot_namespace_labels) {.kubernetes.namespace_labels = del(._internal.dedot_namespace_labels) }
  del(.kubernetes.node_labels)
  del(.kubernetes.container_image_id)
  del(.kubernetes.pod_ips)
}
";

pub const SET_TIMESTAMP_ON_ROOT: &str = r#"
if exists(._internal.timestamp) {
  ."@timestamp" = ._internal.timestamp
  .timestamp = ._internal.timestamp
}
"#;

pub const SET_LOG_TYPE_ON_ROOT: &str = ".log_type = ._internal.log_type";

pub const SET_LOG_SOURCE_ON_ROOT: &str = ".log_source = ._internal.log_source";

pub const SET_HOSTNAME_ON_ROOT: &str = "if exists(._internal.hostname) { .hostname = ._internal.hostname }";

pub const SET_LOG_LEVEL_ON_ROOT: &str = r#"
if ._internal.log_type != "audit" && exists(._internal.level) {
  .level = ._internal.level
}
"#;

pub const SET_MESSAGE_ON_ROOT: &str = r"
if !exists(._internal.structured) {
  .message = ._internal.message
}
";

pub const SET_OPENSHIFT_ON_ROOT: &str = r"
if exists(._internal.openshift) {.openshift = ._internal.openshift}
if exists(._internal.dedot_openshift_labels) {.openshift.labels = del(._internal.dedot_openshift_labels) }
";

pub const SET_OPENSHIFT_SEQUENCE: &str = r#"if ._internal.log_type != "receiver" { ._internal.openshift.sequence = to_unix_timestamp(now(), unit: "nanoseconds") }"#;

/// Moves the record below `._internal` and tags it with its source and type.
///
/// Container records are typed by their namespace.
pub fn internalize(source: LogSource, log_type: Option<LogType>) -> String {
    let log_type = match log_type {
        Some(log_type) => format!("._internal.log_type = {}", vrl_string(log_type.as_ref())),
        None => LOG_TYPE_BY_NAMESPACE.to_owned(),
    };
    join([
        INTERNALIZE.to_owned(),
        format!("._internal.log_source = {}", vrl_string(source.as_ref())),
        log_type,
    ])
}

/// Prefers the node name from the environment over the hostname reported by the source.
pub fn hostname(node_name_env: &str) -> String {
    join([
        "if exists(._internal.host) { ._internal.hostname = del(._internal.host) }".to_owned(),
        format!(
            "._internal.hostname = get_env_var({}) ?? ._internal.hostname",
            vrl_string(node_name_env)
        ),
    ])
}

/// Normalizes container records of the `kubernetes_logs` source.
pub fn container(node_name_env: &str) -> String {
    join([
        internalize(LogSource::Container, None),
        hostname(node_name_env),
        HANDLE_EVENT_ROUTER_LOG.to_owned(),
        SET_LOG_LEVEL.to_owned(),
    ])
}

/// Merges static labels into `._internal.openshift.labels`.
pub fn openshift_labels(labels: &BTreeMap<String, String>) -> String {
    let object = labels
        .iter()
        .map(|(k, v)| format!("{}: {}", vrl_string(k), vrl_string(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("._internal.openshift.labels = merge(object(._internal.openshift.labels) ?? {{}}, {{{object}}})")
}

/// Builds the public record shape for records of the given sources.
pub fn project(
    sources: &BTreeSet<LogSource>,
    labels: &BTreeMap<String, String>,
    cluster_id: &str,
) -> String {
    let mut fragments = vec![
        format!("._internal.openshift.cluster_id = {}", vrl_string(cluster_id)),
        SET_OPENSHIFT_SEQUENCE.to_owned(),
    ];
    if !labels.is_empty() {
        fragments.push(openshift_labels(labels));
    }
    fragments.push(DEDOT_OPENSHIFT_LABELS.to_owned());
    fragments.push(MERGE_STRUCTURED_INTO_ROOT.to_owned());

    for source in sources {
        let body = match source {
            LogSource::Container => join([DEDOT_KUBERNETES_LABELS, SET_KUBERNETES_ON_ROOT]),
            LogSource::Node => super::journal::project(),
            LogSource::Auditd => join([
                r#"."audit.linux" = ._internal."audit.linux""#,
                r#".level = "default""#,
            ]),
            LogSource::KubeApi => ".k8s_audit_level = .level".to_owned(),
            LogSource::OpenshiftApi => ".openshift_audit_level = .level".to_owned(),
            LogSource::Ovn => ".level = ._internal.level".to_owned(),
            LogSource::Syslog => continue,
        };
        fragments.push(when(&source.condition(), &body));
    }

    fragments.extend(
        [
            SET_TIMESTAMP_ON_ROOT,
            SET_LOG_TYPE_ON_ROOT,
            SET_LOG_SOURCE_ON_ROOT,
            SET_HOSTNAME_ON_ROOT,
            SET_LOG_LEVEL_ON_ROOT,
            SET_MESSAGE_ON_ROOT,
            SET_OPENSHIFT_ON_ROOT,
        ]
        .map(str::to_owned),
    );
    join(fragments)
}
