use snafu::ensure;

use super::{
    EmptyFieldSnafu, RenderContext, Result,
    common::{self, Capabilities},
};
use crate::{config::Component, model::AzureMonitorSpec};

/// The HTTP Data Collector API does not accept compressed requests.
const CAPABILITIES: Capabilities = Capabilities {
    compressions: &[],
    batch: true,
    request: true,
};

pub fn build(spec: &AzureMonitorSpec, context: &RenderContext) -> Result<Vec<Component>> {
    ensure!(
        !spec.customer_id.trim().is_empty(),
        EmptyFieldSnafu {
            field: "customerId"
        }
    );
    ensure!(
        !spec.log_type.trim().is_empty(),
        EmptyFieldSnafu { field: "logType" }
    );

    let mut sink = Component::sink(context.id, "azure_monitor_logs", context.inputs.clone())
        .with("customer_id", spec.customer_id.trim())
        .with("log_type", spec.log_type.trim())
        .with("shared_key", spec.authentication.shared_key.value_token())
        .with_table("encoding", common::encoding(None, &[]));
    if let Some(resource_id) = spec.azure_resource_id.as_deref().filter(|r| !r.is_empty()) {
        sink.table.insert("azure_resource_id", resource_id);
    }
    if let Some(host) = spec.host.as_deref().filter(|h| !h.is_empty()) {
        sink.table.insert("host", host);
    }

    let sink = common::finish(
        sink,
        spec.tuning.as_ref(),
        &CAPABILITIES,
        true,
        context.tls,
        context.options,
    )?;
    Ok(vec![sink])
}
