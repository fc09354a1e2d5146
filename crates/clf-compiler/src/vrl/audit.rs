//! Normalization of audit records.
//!
//! API server audit events end up as an object in `._internal.structured`, which the pipeline
//! tail merges into the root of the record.

use super::{
    join,
    viaq::{self, LogSource, LogType, internalize},
};

pub const PARSE_HOST_AUDIT_LOGS: &str = r#"
match1 = parse_regex(._internal.message, r'type=(?P<type>[^ ]+)') ?? {}
envelop = {}
envelop |= {"type": match1.type}

match2, err = parse_regex(._internal.message, r'msg=audit\((?P<ts_record>[^ ]+)\):')
if err == null {
  sp, err = split(match2.ts_record, ":")
  if err == null && length(sp) == 2 {
    ts = parse_timestamp(sp[0], "%s.%3f") ?? ""
    envelop |= {"record_id": sp[1]}
    ._internal."audit.linux" = envelop
    ._internal.timestamp = ts
  }
} else {
  log("could not parse host audit msg. err=" + err, rate_limit_secs: 0)
}
"#;

pub const PARSE_AUDIT_EVENT: &str = r#"
parsed, err = parse_json(string(._internal.message) ?? "")
if err == null && is_object(parsed) {
  ._internal.structured = parsed
}
"#;

pub const SET_AUDIT_TIMESTAMP: &str = r#"
if exists(._internal.structured.requestReceivedTimestamp) {
  ._internal.timestamp = parse_timestamp(string(._internal.structured.requestReceivedTimestamp) ?? "", format: "%+") ?? ._internal.timestamp
}
"#;

/// Moves a JSON event received over HTTP below `._internal.structured`.
pub const INTERNALIZE_RECEIVED_EVENT: &str = r#"
timestamp = del(.timestamp) || now()
del(.source_type)
del(.path)
. = {"_internal": {"structured": ., "timestamp": timestamp}}
"#;

/// Normalizes records of the host `auditd` log.
pub fn host(node_name_env: &str) -> String {
    join([
        internalize(LogSource::Auditd, Some(LogType::Audit)),
        viaq::hostname(node_name_env),
        PARSE_HOST_AUDIT_LOGS.to_owned(),
        r#"._internal.level = "default""#.to_owned(),
    ])
}

/// Normalizes API server audit events read from a log file.
pub fn api_server(source: LogSource, node_name_env: &str) -> String {
    join([
        internalize(source, Some(LogType::Audit)),
        viaq::hostname(node_name_env),
        PARSE_AUDIT_EVENT.to_owned(),
        SET_AUDIT_TIMESTAMP.to_owned(),
    ])
}

/// Normalizes API server audit events posted to an HTTP receiver.
pub fn received_event(node_name_env: &str) -> String {
    join([
        INTERNALIZE_RECEIVED_EVENT.to_owned(),
        format!(
            "._internal.log_source = \"{}\"\n._internal.log_type = \"{}\"",
            LogSource::KubeApi,
            LogType::Audit
        ),
        viaq::hostname(node_name_env),
        SET_AUDIT_TIMESTAMP.to_owned(),
    ])
}

/// Normalizes OVN ACL audit records.
pub fn ovn(node_name_env: &str) -> String {
    join([
        internalize(LogSource::Ovn, Some(LogType::Audit)),
        viaq::hostname(node_name_env),
        viaq::SET_LOG_LEVEL.to_owned(),
    ])
}

/// Normalizes records of a syslog receiver.
pub fn syslog(node_name_env: &str) -> String {
    join([
        internalize(LogSource::Syslog, Some(LogType::Infrastructure)),
        viaq::hostname(node_name_env),
        "if exists(._internal.severity) { ._internal.level = ._internal.severity }".to_owned(),
        viaq::SET_LOG_LEVEL.to_owned(),
    ])
}
