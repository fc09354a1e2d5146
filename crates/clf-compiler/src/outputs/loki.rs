//! The Loki sink.
//!
//! Label keys are written loosely, `.kubernetes.labels.app.kubernetes.io/name` refers to the
//! label `app.kubernetes.io/name`. Everything after `kubernetes.labels.` and
//! `kubernetes.namespace_labels.` is therefore taken as a single key. Label values are copied
//! below `._internal.loki_labels` by a remap transform, the sink reads them from there.

use std::collections::BTreeMap;

use snafu::{ResultExt, ensure};

use super::{
    EmptyFieldSnafu, InvalidFieldPathSnafu, RenderContext, Result,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Table},
    field_path::{self, FieldPath},
    ids,
    model::LokiSpec,
    vrl,
};

const COMPRESSIONS: [&str; 2] = ["gzip", "snappy"];

const DEFAULT_LABEL_KEYS: [&str; 4] = [
    "log_type",
    "kubernetes.namespace_name",
    "kubernetes.pod_name",
    "kubernetes.container_name",
];

/// Label keys below these prefixes name a single map entry.
const MAP_PREFIXES: [&str; 2] = ["kubernetes.labels.", "kubernetes.namespace_labels."];

const HOST_LABEL: &str = "kubernetes_host";

/// Resolves a label key to its label name and the record path of its value.
fn label(key: &str) -> Result<(String, FieldPath)> {
    let trimmed = key.trim().trim_start_matches('.');
    ensure!(!trimmed.is_empty(), EmptyFieldSnafu { field: "labelKeys" });
    let name = field_path::label_name(trimmed);

    for prefix in MAP_PREFIXES {
        if let Some(entry) = trimmed.strip_prefix(prefix) {
            let entry = entry.replace('"', "");
            ensure!(!entry.is_empty(), EmptyFieldSnafu { field: "labelKeys" });
            let segments = prefix
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .chain([entry]);
            return Ok((name, FieldPath::from_segments(segments)));
        }
    }

    let path = format!(".{trimmed}")
        .parse()
        .context(InvalidFieldPathSnafu { field: key })?;
    Ok((name, path))
}

fn labels(spec: &LokiSpec) -> Result<BTreeMap<String, FieldPath>> {
    if spec.label_keys.is_empty() {
        DEFAULT_LABEL_KEYS.iter().map(|key| label(key)).collect()
    } else {
        spec.label_keys.iter().map(|key| label(key)).collect()
    }
}

fn internal_label(name: &str) -> FieldPath {
    FieldPath::from_segments(["_internal", "loki_labels", name])
}

pub fn build(spec: &LokiSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let url = common::parse_url(&spec.url, &HTTP_SCHEMES)?;
    let labels = labels(spec)?;
    let tenant_key = spec.tenant_key.as_deref().filter(|t| !t.is_empty());
    let tenant = tenant_key
        .map(|t| common::template("tenantKey", t))
        .transpose()?;

    let mut program: Vec<String> = labels
        .iter()
        .map(|(name, path)| {
            format!(
                "{} = to_string({}) ?? \"\"",
                internal_label(name),
                path.under("._internal")
            )
        })
        .collect();
    if let Some(tenant) = tenant.as_ref().filter(|t| t.is_dynamic()) {
        program.push(format!("._internal.loki_tenant = {}", tenant.to_vrl()));
    }

    let remap_id = ids::child(context.id, "remap_label");
    let remap = Component::remap(&remap_id, context.inputs.clone(), vrl::join(program))
        .with("drop_on_error", true)
        .describe("Copy the Loki label values");

    let mut label_table = Table::new().with(
        HOST_LABEL,
        format!("${{{}}}", context.options.node_name_env()),
    );
    for name in labels.keys() {
        let reference = internal_label(name).to_string();
        label_table.insert(
            name.as_str(),
            format!("{{{{ {} }}}}", reference.trim_start_matches('.')),
        );
    }

    let mut sink = Component::sink(context.id, "loki", vec![remap_id])
        .with("endpoint", &spec.url)
        .with("out_of_order_action", "accept")
        .with_table("healthcheck", Table::new().with("enabled", false))
        .with_table("labels", label_table)
        .with_table("encoding", common::encoding(Some("json"), &[]))
        .with_table("auth", common::http_auth(spec.authentication.as_ref())?);
    match (tenant_key, &tenant) {
        (_, Some(tenant)) if tenant.is_dynamic() => {
            sink.table.insert("tenant_id", "{{ _internal.loki_tenant }}");
        }
        (Some(tenant_key), _) => {
            sink.table.insert("tenant_id", tenant_key);
        }
        _ => {}
    }

    let sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &Capabilities::http(&COMPRESSIONS),
        common::is_secure(&url),
        context.tls,
        context.options,
    )?;
    Ok(vec![remap, sink])
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::{
        config::Value,
        options::CompileOptions,
        outputs::tests::{output, render_output},
    };

    #[rstest]
    #[case(
        ".kubernetes.labels.app.kubernetes.io/name",
        "kubernetes_labels_app_kubernetes_io_name",
        r#"._internal.kubernetes.labels."app.kubernetes.io/name""#
    )]
    #[case(
        ".kubernetes.labels.prefix-cloud_com_platform-stage",
        "kubernetes_labels_prefix_cloud_com_platform_stage",
        r#"._internal.kubernetes.labels."prefix-cloud_com_platform-stage""#
    )]
    #[case(
        "kubernetes.namespace_labels.team",
        "kubernetes_namespace_labels_team",
        "._internal.kubernetes.namespace_labels.team"
    )]
    #[case("log_type", "log_type", "._internal.log_type")]
    #[case(".kubernetes.pod_name", "kubernetes_pod_name", "._internal.kubernetes.pod_name")]
    fn resolves_label_keys(#[case] key: &str, #[case] name: &str, #[case] value: &str) {
        let (label_name, path) = label(key).expect("label key is valid");
        assert_eq!(label_name, name);
        assert_eq!(path.under("._internal"), value);
    }

    #[test]
    fn labels_streams_with_flat_names() {
        let output = output(indoc! {r#"
            name: loki-app
            type: loki
            loki:
              url: https://loki.example:3100
              tenantKey: '{.kubernetes.namespace_name||"default"}'
              labelKeys:
                - .kubernetes.labels.app.kubernetes.io/name
                - .kubernetes.labels.prefix-cloud_com_platform-stage
        "#});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        assert_eq!(
            config.render(),
            indoc! {r#"
                # Copy the Loki label values
                [transforms.output_loki_app_remap_label]
                type = "remap"
                inputs = ["pipeline_p_viaq_0"]
                drop_on_error = true
                source = '''
                  ._internal.loki_labels.kubernetes_labels_app_kubernetes_io_name = to_string(._internal.kubernetes.labels."app.kubernetes.io/name") ?? ""
                  ._internal.loki_labels.kubernetes_labels_prefix_cloud_com_platform_stage = to_string(._internal.kubernetes.labels."prefix-cloud_com_platform-stage") ?? ""
                  ._internal.loki_tenant = (to_string(._internal.kubernetes.namespace_name || "default") ?? "default")
                '''

                [sinks.output_loki_app]
                type = "loki"
                inputs = ["output_loki_app_remap_label"]
                endpoint = "https://loki.example:3100"
                out_of_order_action = "accept"
                tenant_id = "{{ _internal.loki_tenant }}"

                [sinks.output_loki_app.encoding]
                codec = "json"
                except_fields = ["_internal"]

                [sinks.output_loki_app.healthcheck]
                enabled = false

                [sinks.output_loki_app.labels]
                kubernetes_host = "${VECTOR_SELF_NODE_NAME}"
                kubernetes_labels_app_kubernetes_io_name = "{{ _internal.loki_labels.kubernetes_labels_app_kubernetes_io_name }}"
                kubernetes_labels_prefix_cloud_com_platform_stage = "{{ _internal.loki_labels.kubernetes_labels_prefix_cloud_com_platform_stage }}"
            "#}
        );
    }

    #[test]
    fn uses_default_labels_and_static_tenants() {
        let output = output(indoc! {"
            name: loki
            type: loki
            loki:
              url: http://loki:3100
              tenantKey: infra
        "});
        let options = CompileOptions {
            collector_self_node_name_env: Some("NODE_NAME".to_owned()),
            ..CompileOptions::default()
        };
        let config = render_output(&output, &options).expect("output renders");
        let sink = config.component("output_loki").expect("sink exists");

        assert_eq!(sink.table.get("tenant_id"), Some(&Value::from("infra")));
        let labels = sink.table.table("labels").expect("labels are set");
        for name in [
            "kubernetes_container_name",
            "kubernetes_namespace_name",
            "kubernetes_pod_name",
            "log_type",
        ] {
            assert!(labels.get(name).is_some(), "{name}");
        }
        assert_eq!(labels.get(HOST_LABEL), Some(&Value::from("${NODE_NAME}")));

        let remap = config.component("output_loki_remap_label").expect("remap exists");
        assert_eq!(vrl::check(remap.vrl().expect("remap has a program")), Ok(()));
        assert!(!remap.vrl().unwrap_or_default().contains("loki_tenant"));
    }

    #[test]
    fn rejects_empty_map_keys() {
        let error = label(".kubernetes.labels.").expect_err("map key is empty");
        assert_eq!(error.to_string(), "labelKeys must not be empty");
    }
}
