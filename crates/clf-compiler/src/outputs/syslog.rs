//! The syslog sink, a `socket` sink with the syslog codec.
//!
//! The header fields are evaluated into `._internal.syslog` by a remap transform. Fields the
//! user leaves unset get a default depending on the source of the record, see
//! [`source_defaults`].

use std::str::FromStr;

use snafu::OptionExt;
use strum::{AsRefStr, EnumString};

use super::{
    RenderContext, Result, UnknownEnrichmentSnafu, UnknownRfcSnafu,
    common::{self, Capabilities},
};
use crate::{
    config::Component,
    ids,
    model::SyslogSpec,
    template::{Template, vrl_string},
    vrl,
};

const SCHEMES: [&str; 3] = ["tcp", "tls", "udp"];
const DEFAULT_PORT: u16 = 514;

const CAPABILITIES: Capabilities = Capabilities {
    compressions: &[],
    batch: false,
    request: false,
};

const NODE: &str = r#"._internal.log_type == "infrastructure" && ._internal.log_source == "node""#;
const CONTAINER: &str = r#"._internal.log_source == "container""#;
const AUDIT: &str = r#"._internal.log_type == "audit""#;

const CONTAINER_NAMES: &str = "[._internal.kubernetes.namespace_name, ._internal.kubernetes.pod_name, ._internal.kubernetes.container_name]";

#[derive(AsRefStr, Clone, Copy, Debug, Default, EnumString, Eq, PartialEq)]
#[strum(ascii_case_insensitive)]
enum Rfc {
    #[strum(serialize = "RFC3164")]
    Rfc3164,

    #[default]
    #[strum(serialize = "RFC5424")]
    Rfc5424,
}

#[derive(Clone, Copy, Debug, Default, EnumString, Eq, PartialEq)]
#[strum(ascii_case_insensitive)]
enum Enrichment {
    #[default]
    None,
    KubernetesMinimal,
}

/// A syslog header field.
struct Field {
    /// Key below `._internal.syslog` and in the encoding table.
    name: &'static str,
    user: Option<Template>,
    fallback: &'static str,
}

fn field(
    name: &'static str,
    spec_field: &str,
    value: Option<&String>,
    fallback: &'static str,
) -> Result<Field> {
    let user = value
        .filter(|v| !v.is_empty())
        .map(|v| common::template(spec_field, v))
        .transpose()?;
    Ok(Field {
        name,
        user,
        fallback,
    })
}

fn fields(spec: &SyslogSpec, rfc: Rfc) -> Result<Vec<Field>> {
    let mut fields = vec![
        field("facility", "facility", spec.facility.as_ref(), "user")?,
        field("severity", "severity", spec.severity.as_ref(), "informational")?,
        field("proc_id", "procId", spec.proc_id.as_ref(), "-")?,
    ];
    match rfc {
        Rfc::Rfc3164 => fields.push(field("tag", "appName", spec.app_name.as_ref(), "")?),
        Rfc::Rfc5424 => {
            fields.push(field("app_name", "appName", spec.app_name.as_ref(), "-")?);
            fields.push(field("msg_id", "msgId", spec.msg_id.as_ref(), "-")?);
        }
    }
    Ok(fields)
}

type Assignments = Vec<(&'static str, String)>;

/// Defaults of the header fields, guarded by a condition on the record source.
fn source_defaults(rfc: Rfc) -> Vec<(Option<&'static str>, Assignments)> {
    let severity = ("severity", "._internal.level".to_owned());
    let user = ("facility", vrl_string("user"));
    let informational = ("severity", vrl_string("informational"));
    let security = ("facility", vrl_string("security"));
    match rfc {
        Rfc::Rfc3164 => vec![
            (
                Some(NODE),
                vec![
                    ("tag", r#"to_string(._internal.systemd.u.SYSLOG_IDENTIFIER) ?? """#.to_owned()),
                    ("proc_id", r#"to_string(._internal.systemd.t.PID) ?? """#.to_owned()),
                ],
            ),
            (
                Some(CONTAINER),
                vec![
                    (
                        "tag",
                        format!(
                            r#"truncate(replace(join({CONTAINER_NAMES}, "") ?? "", r'[^a-zA-Z0-9]', ""), 32)"#
                        ),
                    ),
                    severity,
                    user,
                ],
            ),
            (
                Some(AUDIT),
                vec![
                    ("tag", "._internal.log_source".to_owned()),
                    informational,
                    security,
                ],
            ),
        ],
        Rfc::Rfc5424 => vec![
            (
                Some(NODE),
                vec![
                    ("app_name", r#"to_string(._internal.systemd.u.SYSLOG_IDENTIFIER) ?? "-""#.to_owned()),
                    ("proc_id", r#"to_string(._internal.systemd.t.PID) ?? "-""#.to_owned()),
                ],
            ),
            (
                Some(CONTAINER),
                vec![
                    ("app_name", format!(r#"join({CONTAINER_NAMES}, "_") ?? "-""#)),
                    ("proc_id", r#"to_string(._internal.kubernetes.pod_id) ?? "-""#.to_owned()),
                    severity,
                    user,
                ],
            ),
            (
                Some(AUDIT),
                vec![
                    ("app_name", "._internal.log_source".to_owned()),
                    ("proc_id", r#"to_string(._internal.auditID) ?? "-""#.to_owned()),
                    informational,
                    security,
                ],
            ),
            (None, vec![("msg_id", "._internal.log_source".to_owned())]),
        ],
    }
}

fn program(fields: &[Field], rfc: Rfc, payload: Option<&Template>) -> String {
    let is_user_set = |name: &str| {
        fields
            .iter()
            .any(|field| field.name == name && field.user.is_some())
    };

    let mut program = Vec::new();
    for (condition, assignments) in source_defaults(rfc) {
        let body: Vec<String> = assignments
            .into_iter()
            .filter(|(name, _)| !is_user_set(name))
            .map(|(name, expression)| format!("._internal.syslog.{name} = {expression}"))
            .collect();
        match (condition, body.is_empty()) {
            (_, true) => {}
            (None, false) => program.extend(body),
            (Some(condition), false) => program.push(vrl::when(condition, &vrl::join(body))),
        }
    }

    for field in fields {
        if let Some(user) = &field.user {
            program.push(format!("._internal.syslog.{} = {}", field.name, user.to_vrl()));
        }
    }
    for field in fields {
        let fallback = vrl_string(field.fallback);
        program.push(format!(
            "._internal.syslog.{name} = to_string(._internal.syslog.{name} || {fallback}) ?? {fallback}",
            name = field.name,
        ));
    }

    if rfc == Rfc::Rfc3164 {
        program.push(vrl::when(
            r#"._internal.syslog.proc_id != "-" && ._internal.syslog.proc_id != """#,
            r#"._internal.syslog.tag = ._internal.syslog.tag + "[" + ._internal.syslog.proc_id + "]""#,
        ));
    }
    if let Some(payload) = payload {
        program.push(format!("._internal.syslog.payload = {}", payload.to_vrl()));
    }
    vrl::join(program)
}

pub fn build(spec: &SyslogSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let url = common::parse_url(&spec.url, &SCHEMES)?;
    let rfc = match spec.rfc.as_deref().filter(|r| !r.is_empty()) {
        Some(rfc) => Rfc::from_str(rfc).ok().context(UnknownRfcSnafu { rfc })?,
        None => Rfc::default(),
    };
    let enrichment = match spec.enrichment.as_deref().filter(|e| !e.is_empty()) {
        Some(enrichment) => Enrichment::from_str(enrichment)
            .ok()
            .context(UnknownEnrichmentSnafu { enrichment })?,
        None => Enrichment::default(),
    };
    let fields = fields(spec, rfc)?;
    let payload = spec
        .payload_key
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| common::template("payloadKey", p))
        .transpose()?;

    let encoding_id = ids::child(context.id, "parse_encoding");
    let remap = Component::remap(
        &encoding_id,
        context.inputs.clone(),
        program(&fields, rfc, payload.as_ref()),
    )
    .describe("Set the syslog header fields");

    let mut encoding = common::encoding(Some("syslog"), &[])
        .with("rfc", rfc.as_ref().to_ascii_lowercase());
    for field in &fields {
        encoding.insert(field.name, format!("$$._internal.syslog.{}", field.name));
    }
    if enrichment == Enrichment::KubernetesMinimal {
        encoding.insert("add_log_source", true);
    }
    if payload.is_some() {
        encoding.insert("payload_key", "_internal.syslog.payload");
    }

    let secure = common::is_secure(&url);
    let mode = if url.scheme() == "udp" { "udp" } else { "tcp" };
    let sink = Component::sink(context.id, "socket", vec![encoding_id])
        .with("address", common::host_port(&url, DEFAULT_PORT)?)
        .with("mode", mode)
        .with_table("encoding", encoding);

    let mut sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &CAPABILITIES,
        secure,
        context.tls,
        context.options,
    )?;
    if secure {
        sink.table.table_mut("tls").insert("enabled", true);
    }
    Ok(vec![remap, sink])
}
