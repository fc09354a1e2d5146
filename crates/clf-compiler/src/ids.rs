//! Deterministic component identifiers.

use std::sync::LazyLock;

use regex::Regex;
use strum::{AsRefStr, Display};

static ID_REPLACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ .\-]").expect("failed to compile ID replacement regex"));

/// The role prefix of a minted ID.
#[derive(AsRefStr, Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Input,
    Pipeline,
    Output,
}

/// Lowercases `part` and replaces spaces, dots and dashes with underscores.
pub fn normalize(part: &str) -> String {
    ID_REPLACE_REGEX
        .replace_all(&part.to_lowercase(), "_")
        .into_owned()
}

/// Mints the ID `<role>_<p1>_..._<pn>`.
pub fn mint<S: AsRef<str>>(role: Role, parts: &[S]) -> String {
    std::iter::once(role.as_ref())
        .chain(parts.iter().map(AsRef::as_ref))
        .map(normalize)
        .collect::<Vec<_>>()
        .join("_")
}

/// Derives a sub-component ID from an already minted one.
pub fn child(base: &str, suffix: &str) -> String {
    format!("{base}_{suffix}", suffix = normalize(suffix))
}

/// The ID downstream components use to consume one route of a `route` transform.
pub fn route(route_id: &str, source: &str) -> String {
    format!("{route_id}.{source}")
}

/// Anything downstream components can list in their `inputs`.
pub trait InputComponent {
    /// The IDs consumers must list in their `inputs` array.
    fn input_ids(&self) -> Vec<String>;
}
