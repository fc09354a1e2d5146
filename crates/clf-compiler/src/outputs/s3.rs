use snafu::ensure;

use super::{
    EmptyFieldSnafu, RenderContext, Result,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Table},
    ids,
    model::S3Spec,
};

const COMPRESSIONS: [&str; 4] = ["gzip", "zlib", "zstd", "snappy"];
const DEFAULT_KEY_PREFIX: &str = r#"{.log_type||"none"}/{@timestamp|date}/"#;

pub fn build(spec: &S3Spec, context: &RenderContext) -> Result<Vec<Component>> {
    ensure!(!spec.region.trim().is_empty(), EmptyFieldSnafu { field: "region" });
    ensure!(!spec.bucket.trim().is_empty(), EmptyFieldSnafu { field: "bucket" });
    let endpoint = spec.url.as_deref().filter(|url| !url.is_empty());
    let endpoint_url = endpoint
        .map(|url| common::parse_url(url, &HTTP_SCHEMES))
        .transpose()?;
    let key_prefix = common::template(
        "keyPrefix",
        spec.key_prefix
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_KEY_PREFIX),
    )?;
    let auth = common::aws_auth(&spec.authentication, context.name, context.forwarder)?;

    let key_prefix_id = ids::child(context.id, "key_prefix");
    let remap = Component::remap(
        &key_prefix_id,
        context.inputs.clone(),
        format!("._internal.s3_key_prefix = {}", key_prefix.to_vrl()),
    )
    .with("drop_on_error", true)
    .describe("Set the S3 key prefix");

    let mut sink = Component::sink(context.id, "aws_s3", vec![key_prefix_id])
        .with("region", spec.region.trim())
        .with("bucket", spec.bucket.trim())
        .with("key_prefix", "{{ _internal.s3_key_prefix }}")
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
    Ok(vec![remap, sink])
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        config::Value,
        diagnostics::Kind,
        options::CompileOptions,
        outputs::tests::{output, render_output},
    };

    #[test]
    fn writes_below_the_key_prefix() {
        let output = output(indoc! {"
            name: archive
            type: s3
            s3:
              region: us-east-1
              bucket: logs
              authentication:
                type: awsAccessKey
                awsAccessKey:
                  keyId: {secretName: s3, key: id}
                  keySecret: {secretName: s3, key: secret}
              tuning:
                compression: gzip
                maxWrite: 1M
        "});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        assert_eq!(
            config.render(),
            indoc! {r#"
                # Set the S3 key prefix
                [transforms.output_archive_key_prefix]
                type = "remap"
                inputs = ["pipeline_p_viaq_0"]
                drop_on_error = true
                source = '''
                  ._internal.s3_key_prefix = (to_string(._internal.log_type || "none") ?? "none") + "/" + format_timestamp!(._internal.timestamp || now(), format: "%Y-%m-%d") + "/"
                '''

                [sinks.output_archive]
                type = "aws_s3"
                inputs = ["output_archive_key_prefix"]
                bucket = "logs"
                compression = "gzip"
                key_prefix = "{{ _internal.s3_key_prefix }}"
                region = "us-east-1"

                [sinks.output_archive.auth]
                access_key_id = "SECRET[kubernetes_secret.s3/id]"
                secret_access_key = "SECRET[kubernetes_secret.s3/secret]"

                [sinks.output_archive.batch]
                max_bytes = 1000000

                [sinks.output_archive.encoding]
                codec = "json"
                except_fields = ["_internal"]

                [sinks.output_archive.healthcheck]
                enabled = false

                [secret.kubernetes_secret]
                type = "file"
                base_path = "/collector/secrets"
            "#}
        );
    }

    #[test]
    fn targets_compatible_stores() {
        let output = output(indoc! {"
            name: minio
            type: s3
            s3:
              url: http://minio:9000
              region: local
              bucket: logs
              keyPrefix: '{.kubernetes.namespace_name||\"none\"}/'
              authentication:
                type: iamRole
                iamRole:
                  roleArn: {secretName: s3, key: role}
        "});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");
        let sink = config.component("output_minio").expect("sink exists");

        assert_eq!(sink.table.get("endpoint"), Some(&Value::from("http://minio:9000")));
        assert_eq!(
            config.component("output_minio_key_prefix").and_then(Component::vrl),
            Some(r#"._internal.s3_key_prefix = (to_string(._internal.kubernetes.namespace_name || "none") ?? "none") + "/""#)
        );
    }

    #[test]
    fn requires_a_bucket() {
        let output = output(indoc! {"
            name: s3
            type: s3
            s3:
              region: us-east-1
              bucket: ''
              authentication: {type: iamRole}
        "});
        let error = render_output(&output, &CompileOptions::default()).expect_err("bucket is empty");
        assert_eq!(error.kind(), Kind::SchemaInvalid);
        assert_eq!(error.to_string(), "bucket must not be empty");
    }
}
