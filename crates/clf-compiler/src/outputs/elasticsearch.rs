use snafu::ensure;

use super::{
    RenderContext, Result, UnsupportedVersionSnafu,
    common::{self, Capabilities, HTTP_SCHEMES},
};
use crate::{
    config::{Component, Table, Value},
    ids,
    model::ElasticsearchSpec,
    vrl,
};

const COMPRESSIONS: [&str; 4] = ["gzip", "zlib", "zstd", "snappy"];
const DEFAULT_INDEX: &str = r#"{.log_type||"none"}"#;
const DEFAULT_VERSION: u8 = 8;

/// Field holding the evaluated index template. It is not part of the document.
const WRITE_INDEX_FIELD: &str = "write_index";

const SET_DOCUMENT_ID: &str = "._id = encode_base64(uuid_v4())";

pub fn build(spec: &ElasticsearchSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let url = common::parse_url(&spec.url, &HTTP_SCHEMES)?;
    let version = spec.version.unwrap_or(DEFAULT_VERSION);
    ensure!((6..=8).contains(&version), UnsupportedVersionSnafu { version });
    let index = common::template("index", spec.index.as_deref().unwrap_or(DEFAULT_INDEX))?;

    let index_id = ids::child(context.id, "add_es_index");
    let add_index = Component::remap(
        &index_id,
        context.inputs.clone(),
        vrl::join([
            format!(".{WRITE_INDEX_FIELD} = {}", index.to_vrl()),
            SET_DOCUMENT_ID.to_owned(),
        ]),
    )
    .with("drop_on_error", true)
    .describe("Set the Elasticsearch index and document ID");

    let mut sink = Component::sink(context.id, "elasticsearch", vec![index_id])
        .with("endpoints", Value::strings([&spec.url]))
        .with("api_version", format!("v{version}"))
        .with("id_key", "_id")
        .with_table(
            "bulk",
            Table::new()
                .with("action", "create")
                .with("index", format!("{{{{ {WRITE_INDEX_FIELD} }}}}")),
        )
        .with_table("encoding", common::encoding(None, &[WRITE_INDEX_FIELD]))
        .with_table("auth", common::http_auth(spec.authentication.as_ref())?);
    if version >= 8 {
        sink.table.insert("suppress_type_name", true);
    }

    let sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &Capabilities::http(&COMPRESSIONS),
        common::is_secure(&url),
        context.tls,
        context.options,
    )?;
    Ok(vec![add_index, sink])
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

    #[test]
    fn writes_to_the_templated_index() {
        let output = output(indoc! {r#"
            name: es-1
            type: elasticsearch
            elasticsearch:
              url: https://es.example:9200
              index: 'app-{.kubernetes.namespace_name||"none"}'
              authentication:
                username: {secretName: es, key: username}
                password: {secretName: es, key: password}
              tuning:
                compression: gzip
        "#});
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");

        assert_eq!(
            config.render(),
            indoc! {r#"
                # Set the Elasticsearch index and document ID
                [transforms.output_es_1_add_es_index]
                type = "remap"
                inputs = ["pipeline_p_viaq_0"]
                drop_on_error = true
                source = '''
                  .write_index = "app-" + (to_string(._internal.kubernetes.namespace_name || "none") ?? "none")
                  ._id = encode_base64(uuid_v4())
                '''

                [sinks.output_es_1]
                type = "elasticsearch"
                inputs = ["output_es_1_add_es_index"]
                api_version = "v8"
                compression = "gzip"
                endpoints = ["https://es.example:9200"]
                id_key = "_id"
                suppress_type_name = true

                [sinks.output_es_1.auth]
                password = "SECRET[kubernetes_secret.es/password]"
                strategy = "basic"
                user = "SECRET[kubernetes_secret.es/username]"

                [sinks.output_es_1.bulk]
                action = "create"
                index = "{{ write_index }}"

                [sinks.output_es_1.encoding]
                except_fields = ["_internal","write_index"]

                [secret.kubernetes_secret]
                type = "file"
                base_path = "/collector/secrets"
            "#}
        );
    }

    #[rstest]
    #[case(6, "v6", false)]
    #[case(7, "v7", false)]
    #[case(8, "v8", true)]
    fn selects_the_api_version(#[case] version: u8, #[case] api: &str, #[case] suppressed: bool) {
        let output = output(&format!(
            "name: es\ntype: elasticsearch\nelasticsearch:\n  url: http://es:9200\n  version: {version}\n"
        ));
        let config = render_output(&output, &CompileOptions::default()).expect("output renders");
        let sink = config.component("output_es").expect("sink exists");

        assert_eq!(sink.table.get("api_version"), Some(&Value::from(api)));
        assert_eq!(sink.table.get("suppress_type_name").is_some(), suppressed);
        assert!(sink.table.table("tls").is_none_or(Table::is_empty));
    }

    #[rstest]
    #[case("url: http://es:9200\n  version: 5", Kind::EnumInvalid)]
    #[case("url: es:9200", Kind::SchemaInvalid)]
    #[case("url: http://es:9200\n  index: '{.log_type'", Kind::SchemaInvalid)]
    #[case("url: http://es:9200\n  tuning: {compression: lz4}", Kind::EnumInvalid)]
    fn rejects_invalid_specs(#[case] body: &str, #[case] kind: Kind) {
        let output = output(&format!("name: es\ntype: elasticsearch\nelasticsearch:\n  {body}\n"));
        let error = render_output(&output, &CompileOptions::default()).expect_err("spec is invalid");
        assert_eq!(error.kind(), kind);
    }
}
