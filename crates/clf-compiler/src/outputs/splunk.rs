//! The Splunk HTTP Event Collector sink.
//!
//! Source, source type and index are evaluated into `._internal.splunk` by a remap transform and
//! read back by the sink templates. Indexed fields are moved out of the event to top-level
//! fields with flat names, which the sink then sends as HEC indexed fields.

use snafu::ResultExt;

use super::{
    InvalidFieldPathSnafu, RenderContext, Result,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Value},
    field_path::FieldPath,
    ids,
    model::SplunkSpec,
    vrl,
};

const COMPRESSIONS: [&str; 1] = ["gzip"];

const PARSE_TIMESTAMP: &str = r#"
ts, err = parse_timestamp(._internal.timestamp, "%+")
if err == null {
  ._internal.timestamp = ts
}
"#;

const DEFAULT_SOURCE: &str = r#"
if ._internal.log_type == "infrastructure" && ._internal.log_source == "node" {
  ._internal.splunk.source = to_string(._internal.systemd.u.SYSLOG_IDENTIFIER) ?? ""
}
if ._internal.log_source == "container" {
  ._internal.splunk.source = join([._internal.kubernetes.namespace_name, ._internal.kubernetes.pod_name, ._internal.kubernetes.container_name], "_") ?? ""
}
if ._internal.log_type == "audit" {
  ._internal.splunk.source = ._internal.log_source
}
"#;

const DEFAULT_SOURCE_TYPE: &str = r#"._internal.splunk.sourcetype = "_json""#;

/// Replaces the event with the subtree at `path`, keeping the scratch subtree.
fn narrow_payload(path: &FieldPath, detect_source_type: bool) -> String {
    let mut body = vec![
        format!("value = {path}"),
        "internal = ._internal".to_owned(),
        ". = {}".to_owned(),
        format!("{path} = value"),
        "._internal = internal".to_owned(),
    ];
    if detect_source_type {
        body.push(
            r#"if !is_object(value) { ._internal.splunk.sourcetype = "generic_single_line" }"#
                .to_owned(),
        );
    }
    vrl::when(&format!("exists({path})"), &vrl::join(body))
}

/// Moves the value at `path` to the top-level field `flat`, encoding it as a string.
fn hoist(path: &FieldPath, flat: &FieldPath) -> String {
    vrl::when(
        &format!("exists({path})"),
        &vrl::join([
            format!("value = del({path})"),
            "if !is_string(value) { value = encode_json(value) }".to_owned(),
            format!("{flat} = value"),
        ]),
    )
}

fn path(field: &str, path: &str) -> Result<FieldPath> {
    path.parse().context(InvalidFieldPathSnafu { field })
}

pub fn build(spec: &SplunkSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let url = common::parse_url(&spec.url, &HTTP_SCHEMES)?;
    let source = spec
        .source
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| common::template("source", s))
        .transpose()?;
    let source_type = spec
        .source_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| common::template("sourceType", s))
        .transpose()?;
    let index_key = spec
        .index_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(|k| path("indexKey", k))
        .transpose()?;
    let payload_key = spec
        .payload_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(|k| path("payloadKey", k))
        .transpose()?;
    let indexed_fields = spec
        .indexed_fields
        .iter()
        .map(|field| path("indexedFields", field))
        .collect::<Result<Vec<_>>>()?;

    let mut program = vec![match &source {
        Some(source) => format!("._internal.splunk.source = {}", source.to_vrl()),
        None => DEFAULT_SOURCE.to_owned(),
    }];
    program.push(match &source_type {
        Some(source_type) => format!("._internal.splunk.sourcetype = {}", source_type.to_vrl()),
        None => DEFAULT_SOURCE_TYPE.to_owned(),
    });
    if let Some(index_key) = &index_key {
        program.push(format!(
            "._internal.splunk.index = to_string({}) ?? \"\"",
            index_key.under("._internal")
        ));
    }
    if let Some(payload_key) = &payload_key {
        program.push(narrow_payload(payload_key, source_type.is_none()));
    }
    let flat_names: Vec<String> = indexed_fields
        .iter()
        .map(|field| {
            let flat = field.flatten();
            program.push(hoist(field, &FieldPath::from_segments([flat.as_str()])));
            flat
        })
        .collect();

    let timestamp_id = ids::child(context.id, "timestamp");
    let timestamp = Component::remap(&timestamp_id, context.inputs.clone(), PARSE_TIMESTAMP)
        .describe("Ensure the timestamp is well formatted for Splunk");
    let metadata_id = ids::child(context.id, "metadata");
    let metadata = Component::remap(&metadata_id, vec![timestamp_id], vrl::join(program))
        .describe("Set the Splunk metadata");

    let mut sink = Component::sink(context.id, "splunk_hec_logs", vec![metadata_id])
        .with("endpoint", &spec.url)
        .with("default_token", spec.authentication.token.value_token())
        .with("source", "{{ _internal.splunk.source }}")
        .with("sourcetype", "{{ _internal.splunk.sourcetype }}")
        .with("host_key", "._internal.hostname")
        .with("timestamp_key", "._internal.timestamp")
        .with_table("encoding", common::encoding(Some("json"), &[]));
    if !flat_names.is_empty() {
        sink.table.insert("indexed_fields", Value::strings(flat_names));
    }
    if index_key.is_some() {
        sink.table.insert("index", "{{ _internal.splunk.index }}");
    } else if let Some(index_name) = spec.index_name.as_deref().filter(|i| !i.is_empty()) {
        sink.table.insert("index", index_name);
    }

    let sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &Capabilities::http(&COMPRESSIONS),
        common::is_secure(&url),
        context.tls,
        context.options,
    )?;
    Ok(vec![timestamp, metadata, sink])
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

    const SPLUNK: &str = indoc! {r#"
        name: splunk
        type: splunk
        splunk:
          url: https://splunk.example:8088
          authentication:
            token: {secretName: hec, key: token}
          indexedFields:
            - .log_type
            - .openshift.sequence
            - .kubernetes.annotations."openshift.io/scc"
    "#};

    #[test]
    fn hoists_indexed_fields() {
        let output = output(SPLUNK);
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        let sink = config.component("output_splunk").expect("sink exists");
        assert_eq!(sink.inputs, ["output_splunk_metadata"]);
        assert_eq!(
            sink.table.get("indexed_fields"),
            Some(&Value::strings([
                "log_type",
                "openshift_sequence",
                "kubernetes_annotations_openshift_io_scc"
            ]))
        );
        assert_eq!(
            sink.table.get("default_token"),
            Some(&Value::from("SECRET[kubernetes_secret.hec/token]"))
        );
        assert!(sink.table.get("index").is_none());

        let metadata = config.component("output_splunk_metadata").expect("remap exists");
        assert_eq!(metadata.inputs, ["output_splunk_timestamp"]);
        let program = metadata.vrl().expect("remap has a program");
        assert!(program.ends_with(indoc! {r#"
            if exists(.log_type) {
              value = del(.log_type)
              if !is_string(value) { value = encode_json(value) }
              .log_type = value
            }
            if exists(.openshift.sequence) {
              value = del(.openshift.sequence)
              if !is_string(value) { value = encode_json(value) }
              .openshift_sequence = value
            }
            if exists(.kubernetes.annotations."openshift.io/scc") {
              value = del(.kubernetes.annotations."openshift.io/scc")
              if !is_string(value) { value = encode_json(value) }
              .kubernetes_annotations_openshift_io_scc = value
            }"#}));
        assert!(program.contains(r#"._internal.splunk.sourcetype = "_json""#));
        assert_eq!(vrl::check(program), Ok(()));
    }

    #[test]
    fn narrows_the_payload() {
        let output = output(indoc! {r#"
            name: splunk
            type: splunk
            splunk:
              url: http://splunk:8088
              authentication:
                token: {secretName: hec, key: token}
              payloadKey: .structured
              indexKey: .kubernetes.namespace_name
              indexName: ignored
              source: '{.kubernetes.pod_name||"unknown"}'
        "#});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        let sink = config.component("output_splunk").expect("sink exists");
        assert_eq!(
            sink.table.get("index"),
            Some(&Value::from("{{ _internal.splunk.index }}"))
        );

        let metadata = config.component("output_splunk_metadata").expect("remap exists");
        let program = metadata.vrl().expect("remap has a program");
        assert_eq!(
            program,
            indoc! {r#"
                ._internal.splunk.source = (to_string(._internal.kubernetes.pod_name || "unknown") ?? "unknown")
                ._internal.splunk.sourcetype = "_json"
                ._internal.splunk.index = to_string(._internal.kubernetes.namespace_name) ?? ""
                if exists(.structured) {
                  value = .structured
                  internal = ._internal
                  . = {}
                  .structured = value
                  ._internal = internal
                  if !is_object(value) { ._internal.splunk.sourcetype = "generic_single_line" }
                }"#}
        );
    }

    #[test]
    fn uses_static_index_names() {
        let output = output(indoc! {"
            name: splunk
            type: splunk
            splunk:
              url: http://splunk:8088
              authentication:
                token: {secretName: hec, key: token}
              indexName: main
              sourceType: access_combined
        "});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        let sink = config.component("output_splunk").expect("sink exists");
        assert_eq!(sink.table.get("index"), Some(&Value::from("main")));
        let program = config
            .component("output_splunk_metadata")
            .and_then(Component::vrl)
            .expect("remap has a program");
        assert!(program.contains(r#"._internal.splunk.sourcetype = "access_combined""#));
        assert!(program.contains(r#"if ._internal.log_source == "container" {"#));
    }

    #[rstest]
    #[case("indexKey: kubernetes")]
    #[case("payloadKey: .a-b")]
    #[case("indexedFields: ['']")]
    #[case("source: '{.log_type'")]
    fn rejects_invalid_specs(#[case] body: &str) {
        let output = output(&format!(
            "name: s\ntype: splunk\nsplunk:\n  url: http://s\n  authentication:\n    token: {{secretName: hec, key: token}}\n  {body}\n"
        ));
        let error = render_output(&output, &CompileOptions::default()).expect_err("spec is invalid");
        assert_eq!(error.kind(), Kind::SchemaInvalid);
    }
}
