//! The prune filter.
//!
//! `in` removes fields, `notIn` removes every field except the listed ones. Paths of API server
//! audit events apply to the parsed event too, unless they already point into `.structured`.

use snafu::ensure;

use super::{MissingRequiredFieldsSnafu, PrunesRequiredFieldsSnafu, Result, parse_path};
use crate::{
    field_path::FieldPath,
    model::PruneFilterSpec,
    vrl::{self, when},
};

/// Fields the collector needs to route and ship a record.
const PROTECTED_FIELDS: [&str; 3] = [".log_source", ".log_type", ".message"];

/// Fields which must be kept explicitly by `notIn`. `.log_source` is always kept.
const REQUIRED_FIELDS: [&str; 2] = [".log_type", ".message"];

const IS_AUDIT: &str = r#"._internal.log_type == "audit""#;

fn parse_paths(fields: &[String]) -> Result<Vec<FieldPath>> {
    fields.iter().map(|field| parse_path(field)).collect()
}

fn is_structured(path: &FieldPath) -> bool {
    path.segments().first().is_some_and(|s| s == "structured")
}

fn remove(paths: &[FieldPath]) -> String {
    let removed = paths
        .iter()
        .map(|path| format!("del({})", path.under("._internal")));
    let removed_from_event: Vec<_> = paths
        .iter()
        .filter(|path| !is_structured(path))
        .map(|path| format!("del({})", path.under("._internal.structured")))
        .collect();

    let mut program = vrl::join(removed);
    if !removed_from_event.is_empty() {
        program.push('\n');
        program.push_str(&when(IS_AUDIT, &vrl::join(removed_from_event)));
    }
    program
}

fn keep_if_exists(path: &FieldPath, prefix: &str, target: &str) -> String {
    let source = path.under(prefix);
    format!(
        "if exists({source}) {{ {} = {source} }}",
        path.under(target)
    )
}

fn keep(paths: &[FieldPath]) -> String {
    let kept = paths
        .iter()
        .map(|path| keep_if_exists(path, "._internal", "kept"));
    let kept_from_event: Vec<_> = paths
        .iter()
        .filter(|path| !is_structured(path))
        .map(|path| keep_if_exists(path, "._internal.structured", "kept.structured"))
        .collect();

    let mut lines = vec![
        "kept = {\"log_source\": ._internal.log_source, \"log_type\": ._internal.log_type}"
            .to_owned(),
    ];
    lines.extend(kept);
    if !kept_from_event.is_empty() {
        lines.push(when(IS_AUDIT, &vrl::join(kept_from_event)));
    }
    lines.push("._internal = kept".to_owned());
    vrl::join(lines)
}

/// The VRL program applying `prune` to the internal record.
pub fn program(prune: &PruneFilterSpec) -> Result<String> {
    let removed = parse_paths(&prune.in_)?;
    let kept = parse_paths(&prune.not_in)?;

    let mut protected: Vec<String> = prune
        .in_
        .iter()
        .filter(|field| PROTECTED_FIELDS.contains(&field.as_str()))
        .cloned()
        .collect();
    protected.sort();
    ensure!(
        protected.is_empty(),
        PrunesRequiredFieldsSnafu { fields: protected }
    );

    if !kept.is_empty() {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|required| !prune.not_in.iter().any(|field| field == *required))
            .map(|required| (*required).to_owned())
            .collect();
        ensure!(
            missing.is_empty(),
            MissingRequiredFieldsSnafu { fields: missing }
        );
    }

    let mut fragments = Vec::new();
    if !removed.is_empty() {
        fragments.push(remove(&removed));
    }
    if !kept.is_empty() {
        fragments.push(keep(&kept));
    }
    Ok(vrl::join(fragments))
}
