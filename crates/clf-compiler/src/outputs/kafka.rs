use snafu::ensure;

use super::{
    IncompleteCredentialsSnafu, MissingBrokersSnafu, RenderContext, Result,
    common::{self, Capabilities},
};
use crate::{
    config::{Component, Table},
    ids,
    model::{KafkaSpec, SaslAuthentication},
};

const SCHEMES: [&str; 2] = ["tcp", "tls"];
const DEFAULT_PORT: u16 = 9092;
const DEFAULT_TOPIC: &str = "topic";
const DEFAULT_SASL_MECHANISM: &str = "PLAIN";

const CAPABILITIES: Capabilities = Capabilities {
    compressions: &["gzip", "snappy", "lz4", "zstd"],
    batch: true,
    request: false,
};

/// The topic template: `topic`, else the path of the URL, else `topic`.
fn topic(spec: &KafkaSpec, url_path: Option<&str>) -> String {
    spec.topic
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| url_path.map(|p| p.trim_start_matches('/')).filter(|p| !p.is_empty()))
        .unwrap_or(DEFAULT_TOPIC)
        .to_owned()
}

fn sasl(sasl: &SaslAuthentication) -> Result<Table> {
    let (Some(username), Some(password)) = (&sasl.username, &sasl.password) else {
        return IncompleteCredentialsSnafu {
            what: "sasl.username and sasl.password",
        }
        .fail();
    };
    Ok(Table::new()
        .with("enabled", true)
        .with(
            "mechanism",
            sasl.mechanism
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_SASL_MECHANISM),
        )
        .with("username", username.value_token())
        .with("password", password.value_token()))
}

pub fn build(spec: &KafkaSpec, context: &RenderContext) -> Result<Vec<Component>> {
    let urls = spec
        .url
        .iter()
        .chain(&spec.brokers)
        .filter(|url| !url.is_empty())
        .map(|url| common::parse_url(url, &SCHEMES))
        .collect::<Result<Vec<_>>>()?;
    ensure!(!urls.is_empty(), MissingBrokersSnafu);

    let bootstrap_servers = urls
        .iter()
        .map(|url| common::host_port(url, DEFAULT_PORT))
        .collect::<Result<Vec<_>>>()?
        .join(",");
    let secure = urls.iter().all(common::is_secure);
    let url_path = spec
        .url
        .as_ref()
        .filter(|url| !url.is_empty())
        .and(urls.first())
        .map(url::Url::path);
    let topic = common::template("topic", &topic(spec, url_path))?;

    let topic_id = ids::child(context.id, "topic");
    let remap = Component::remap(
        &topic_id,
        context.inputs.clone(),
        format!("._internal.kafka_topic = {}", topic.to_vrl()),
    )
    .with("drop_on_error", true)
    .describe("Set the Kafka topic");

    let mut sink = Component::sink(context.id, "kafka", vec![topic_id])
        .with("bootstrap_servers", bootstrap_servers)
        .with("topic", "{{ _internal.kafka_topic }}")
        .with_table("healthcheck", Table::new().with("enabled", false))
        .with_table(
            "encoding",
            common::encoding(Some("json"), &[]).with("timestamp_format", "rfc3339"),
        );
    if let Some(sasl_spec) = spec.authentication.as_ref().and_then(|a| a.sasl.as_ref()) {
        sink.table.insert_table("sasl", sasl(sasl_spec)?);
    }

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
