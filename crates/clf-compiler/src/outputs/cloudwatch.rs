use snafu::ensure;

use super::{
    EmptyFieldSnafu, RenderContext, Result,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Table},
    ids,
    model::CloudwatchSpec,
    vrl,
};

const COMPRESSIONS: [&str; 4] = ["gzip", "zlib", "zstd", "snappy"];
const DEFAULT_GROUP_NAME: &str = r#"{.log_type||"none"}"#;

/// Streams are named after the host and the source of the record. Container streams add the
/// namespace, pod and container name.
const STREAM_NAME: &str = r#"
stream_name = to_string(._internal.log_source) ?? "default"
if ._internal.log_source == "container" {
  stream_name = join([._internal.kubernetes.namespace_name, ._internal.kubernetes.pod_name, ._internal.kubernetes.container_name], "_") ?? stream_name
}
if ._internal.log_source == "node" {
  stream_name = "journal.system"
}
._internal.cw_stream_name = (to_string(._internal.hostname) ?? "unknown") + "." + stream_name
"#;

pub fn build(spec: &CloudwatchSpec, context: &RenderContext) -> Result<Vec<Component>> {
    ensure!(!spec.region.trim().is_empty(), EmptyFieldSnafu { field: "region" });
    let endpoint = spec.url.as_deref().filter(|url| !url.is_empty());
    let endpoint_url = endpoint
        .map(|url| common::parse_url(url, &HTTP_SCHEMES))
        .transpose()?;
    let group_name = common::template(
        "groupName",
        spec.group_name
            .as_deref()
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_GROUP_NAME),
    )?;
    let auth = common::aws_auth(&spec.authentication, context.name, context.forwarder)?;

    let names_id = ids::child(context.id, "normalize_group_and_streams");
    let names = Component::remap(
        &names_id,
        context.inputs.clone(),
        vrl::join([
            format!("._internal.cw_group_name = {}", group_name.to_vrl()),
            STREAM_NAME.to_owned(),
        ]),
    )
    .with("drop_on_error", true)
    .describe("Set the CloudWatch group and stream names");

    let mut sink = Component::sink(context.id, "aws_cloudwatch_logs", vec![names_id])
        .with("region", spec.region.trim())
        .with("group_name", "{{ _internal.cw_group_name }}")
        .with("stream_name", "{{ _internal.cw_stream_name }}")
        .with_table("auth", auth)
        .with_table("encoding", common::encoding(Some("json"), &[]))
        .with_table("healthcheck", Table::new().with("enabled", false));
    if let Some(endpoint) = endpoint {
        sink.table.insert("endpoint", endpoint);
    }

    let sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &Capabilities::http(&COMPRESSIONS),
        endpoint_url.as_ref().is_none_or(common::is_secure),
        context.tls,
        context.options,
    )?;
    Ok(vec![names, sink])
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::{
        config::Value,
        diagnostics::Kind,
        options::CompileOptions,
        outputs::tests::{output, render_output},
    };

    #[test]
    fn assumes_the_iam_role_of_the_output() {
        let output = output(indoc! {"
            name: cw
            type: cloudwatch
            cloudwatch:
              region: us-east-2
              groupName: '{.kubernetes.namespace_name||\"unknown\"}'
              authentication:
                type: iamRole
                iamRole:
                  roleArn: {secretName: cw, key: role_arn}
        "});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        let rendered = config.render();
        assert!(rendered.contains(indoc! {r#"
            [sinks.output_cw]
            type = "aws_cloudwatch_logs"
            inputs = ["output_cw_normalize_group_and_streams"]
            group_name = "{{ _internal.cw_group_name }}"
            region = "us-east-2"
            stream_name = "{{ _internal.cw_stream_name }}"

            [sinks.output_cw.auth]
            credentials_file = "/collector/config/instance-aws-credentials/credentials"
            profile = "output_cw"
        "#}));

        let program = config
            .component("output_cw_normalize_group_and_streams")
            .and_then(Component::vrl)
            .expect("remap has a program");
        assert!(program.starts_with(
            r#"._internal.cw_group_name = (to_string(._internal.kubernetes.namespace_name || "unknown") ?? "unknown")"#
        ));
        assert!(program.ends_with(
            r#"._internal.cw_stream_name = (to_string(._internal.hostname) ?? "unknown") + "." + stream_name"#
        ));
        assert_eq!(vrl::check(program), Ok(()));
    }

    #[test]
    fn passes_access_keys_and_endpoints() {
        let output = output(indoc! {"
            name: cw
            type: cloudwatch
            cloudwatch:
              region: eu-west-1
              url: http://localstack:4566
              authentication:
                type: awsAccessKey
                awsAccessKey:
                  keyId: {secretName: cw, key: id}
                  keySecret: {secretName: cw, key: secret}
        "});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");
        let sink = config.component("output_cw").expect("sink exists");

        assert_eq!(
            sink.table.get("endpoint"),
            Some(&Value::from("http://localstack:4566"))
        );
        let auth = sink.table.table("auth").expect("auth is set");
        assert_eq!(
            auth.get("access_key_id"),
            Some(&Value::from("SECRET[kubernetes_secret.cw/id]"))
        );
        assert!(sink.table.table("tls").is_none_or(Table::is_empty));
    }

    #[rstest]
    #[case("region: ' '\n  authentication: {type: awsAccessKey}", Kind::SchemaInvalid)]
    #[case("region: r\n  authentication: {type: password}", Kind::EnumInvalid)]
    #[case("region: r\n  authentication: {type: awsAccessKey}", Kind::SchemaInvalid)]
    fn rejects_invalid_specs(#[case] body: &str, #[case] kind: Kind) {
        let output = output(&format!("name: cw\ntype: cloudwatch\ncloudwatch:\n  {body}\n"));
        let error = render_output(&output, &CompileOptions::default()).expect_err("spec is invalid");
        assert_eq!(error.kind(), kind);
    }
}
