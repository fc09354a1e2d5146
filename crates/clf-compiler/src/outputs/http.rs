use std::str::FromStr;

use snafu::OptionExt;
use strum::{AsRefStr, EnumString};

use super::{
    RenderContext, Result, UnsupportedMethodSnafu,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Table},
    model::HttpSpec,
};

const COMPRESSIONS: [&str; 4] = ["gzip", "zlib", "zstd", "snappy"];
const DEFAULT_TIMEOUT_SECS: u32 = 10;

#[derive(AsRefStr, Clone, Copy, Debug, Default, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum Method {
    Get,
    Head,
    #[default]
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Patch,
}

pub fn build(spec: &HttpSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let url = common::parse_url(&spec.url, &HTTP_SCHEMES)?;
    let method = match spec.method.as_deref().filter(|m| !m.is_empty()) {
        Some(method) => Method::from_str(method)
            .ok()
            .context(UnsupportedMethodSnafu { method })?,
        None => Method::default(),
    };

    let headers = spec
        .headers
        .iter()
        .fold(Table::new(), |table, (name, value)| table.with(name, value));
    let request = Table::new()
        .with(
            "timeout_secs",
            spec.timeout.filter(|t| *t > 0).unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
        .with_table("headers", headers);

    let sink = Component::sink(context.id, "http", context.inputs.clone())
        .with("uri", &spec.url)
        .with("method", method.as_ref())
        .with_table("request", request)
        .with_table("encoding", common::encoding(Some("json"), &[]))
        .with_table("framing", Table::new().with("method", "newline_delimited"))
        .with_table("auth", common::http_auth(spec.authentication.as_ref())?);

    let sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &Capabilities::http(&COMPRESSIONS),
        common::is_secure(&url),
        context.tls,
        context.options,
    )?;
    Ok(vec![sink])
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
    fn posts_newline_delimited_json() {
        let output = output(indoc! {"
            name: my-http
            type: http
            tls:
              ca: {secretName: http-tls, key: ca.crt}
            http:
              url: https://collector.example:8443/logs
              headers:
                X-Tenant: infra
              authentication:
                token: {secretName: http-auth, key: token}
              tuning:
                deliveryMode: atMostOnce
                minRetryDuration: 5
        "});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        assert_eq!(
            config.render(),
            indoc! {r#"
                [sinks.output_my_http]
                type = "http"
                inputs = ["pipeline_p_viaq_0"]
                method = "post"
                uri = "https://collector.example:8443/logs"

                [sinks.output_my_http.auth]
                strategy = "bearer"
                token = "SECRET[kubernetes_secret.http-auth/token]"

                [sinks.output_my_http.buffer]
                type = "memory"
                when_full = "drop_newest"

                [sinks.output_my_http.encoding]
                codec = "json"
                except_fields = ["_internal"]

                [sinks.output_my_http.framing]
                method = "newline_delimited"

                [sinks.output_my_http.request]
                retry_initial_backoff_secs = 5
                timeout_secs = 10

                [sinks.output_my_http.request.headers]
                X-Tenant = "infra"

                [sinks.output_my_http.tls]
                ca_file = "/collector/secrets/http-tls/ca.crt"

                [secret.kubernetes_secret]
                type = "file"
                base_path = "/collector/secrets"
            "#}
        );
    }

    #[rstest]
    #[case(None, "post")]
    #[case(Some("PUT"), "put")]
    #[case(Some("patch"), "patch")]
    fn selects_the_method(#[case] method: Option<&str>, #[case] expected: &str) {
        let method = method.map(|m| format!("  method: {m}\n")).unwrap_or_default();
        let output = output(&format!(
            "name: h\ntype: http\nhttp:\n  url: http://h:80\n  timeout: 30\n{method}"
        ));
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");
        let sink = config.component("output_h").expect("sink exists");

        assert_eq!(sink.table.get("method"), Some(&Value::from(expected)));
        let request = sink.table.table("request").expect("request is set");
        assert_eq!(request.get("timeout_secs"), Some(&Value::Integer(30)));
    }

    #[test]
    fn rejects_unknown_methods() {
        let output = output("name: h\ntype: http\nhttp:\n  url: http://h\n  method: FETCH\n");
        let error = render_output(&output, &CompileOptions::default()).expect_err("method is unknown");
        assert_eq!(error.kind(), Kind::EnumInvalid);
    }
}
