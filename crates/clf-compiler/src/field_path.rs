//! Dotted record paths such as `.kubernetes.labels."app.kubernetes.io/name"`.
//!
//! A path is a sequence of segments, each introduced by a `.`. A segment is either a bare
//! identifier (`[a-zA-Z0-9_]+`) or a double-quoted string which may contain any character
//! except `"`.

use std::{fmt::Display, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

static BARE_SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_]+$").expect("failed to compile bare segment regex")
});

static FLATTEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[./]").expect("failed to compile flatten regex"));

static LABEL_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[./\\\-]").expect("failed to compile label name regex"));

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("field path must not be empty"))]
    Empty,

    #[snafu(display("field path {path:?} must start with a '.'"))]
    MissingLeadingDot { path: String },

    #[snafu(display("field path {path:?} contains an empty segment"))]
    EmptySegment { path: String },

    #[snafu(display("field path {path:?} contains an unterminated quoted segment"))]
    UnterminatedQuote { path: String },

    #[snafu(display(
        "field path {path:?} contains the invalid character {character:?}, quote the segment"
    ))]
    InvalidCharacter { path: String, character: char },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// A validated record path.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The exact segments of the path, without quotes.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Joins the segments with `_`, replacing `.` and `/` inside segments with `_` as well.
    ///
    /// `.kubernetes.labels."x/y.z"` flattens to `kubernetes_labels_x_y_z`.
    pub fn flatten(&self) -> String {
        self.segments
            .iter()
            .map(|segment| FLATTEN_REGEX.replace_all(segment, "_"))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Renders the path relative to another VRL path, e.g. `._internal.kubernetes.pod_name`.
    pub fn under(&self, prefix: &str) -> String {
        format!("{prefix}{self}")
    }

    /// Renders the segments as a VRL array literal, usable with `get!` and `remove!`.
    pub fn vrl_array(&self) -> String {
        let segments: Vec<_> = self
            .segments
            .iter()
            .map(|s| format!("{s:?}"))
            .collect();
        format!("[{}]", segments.join(", "))
    }

    /// Returns `true` if the path starts with all segments of `prefix`.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        ensure!(!path.is_empty(), EmptySnafu);
        ensure!(
            path.starts_with('.'),
            MissingLeadingDotSnafu { path }
        );

        let mut segments = Vec::new();
        let mut rest = path;
        while let Some(stripped) = rest.strip_prefix('.') {
            if let Some(quoted) = stripped.strip_prefix('"') {
                let end = quoted
                    .find('"')
                    .ok_or_else(|| UnterminatedQuoteSnafu { path }.build())?;
                let segment = &quoted[..end];
                ensure!(!segment.is_empty(), EmptySegmentSnafu { path });
                segments.push(segment.to_owned());
                rest = &quoted[end + 1..];
            } else {
                let end = stripped.find('.').unwrap_or(stripped.len());
                let segment = &stripped[..end];
                ensure!(!segment.is_empty(), EmptySegmentSnafu { path });
                if let Some(character) = segment
                    .chars()
                    .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
                {
                    return InvalidCharacterSnafu { path, character }.fail();
                }
                segments.push(segment.to_owned());
                rest = &stripped[end..];
            }
        }

        if let Some(character) = rest.chars().next() {
            return InvalidCharacterSnafu { path, character }.fail();
        }

        Ok(Self { segments })
    }
}

impl TryFrom<String> for FieldPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(value: FieldPath) -> Self {
        value.to_string()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.segments {
            if BARE_SEGMENT_REGEX.is_match(segment) {
                write!(f, ".{segment}")?;
            } else {
                write!(f, ".\"{segment}\"")?;
            }
        }
        Ok(())
    }
}

/// Converts a loosely written path (no quoting required) into a label name.
///
/// Leading dots are removed and `.`, `/`, `\` and `-` are replaced with `_`, so
/// `.kubernetes.labels.app.kubernetes.io/name` becomes `kubernetes_labels_app_kubernetes_io_name`.
pub fn label_name(path: &str) -> String {
    let unquoted = path.trim_start_matches('.').replace('"', "");
    LABEL_NAME_REGEX.replace_all(&unquoted, "_").into_owned()
}
