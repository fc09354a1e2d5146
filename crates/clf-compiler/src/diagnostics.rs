//! Diagnostics accumulated while compiling a forwarder.
//!
//! Nothing in the compiler is thrown to the caller. Problems found with a single input, filter,
//! output or pipeline are recorded here and the offending item is left out of the rendered
//! configuration, so that every other item can still be compiled.

use std::fmt::Display;

use serde::Serialize;
use strum::{Display as StrumDisplay, EnumString};

/// Severity of a [`Diagnostic`].
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// The category a [`Diagnostic`] belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, StrumDisplay)]
pub enum Kind {
    /// A pipeline refers to an input, filter or output that is not declared.
    ReferenceUnresolved,

    /// An item is structurally invalid, e.g. a missing type or a missing variant body.
    SchemaInvalid,

    /// A secret key referenced by an output is not present in the secret store.
    SecretMissing,

    /// An enumerated value (compression, RFC, delivery mode...) is not allowed.
    EnumInvalid,

    /// Generated VRL failed the sanity check.
    VrlCompileFailed,

    /// An audit policy rule uses a lone `*` wildcard.
    WildcardTooLoose,

    /// Two items share the same name (after trimming) or the same component ID.
    Ambiguous,

    /// Informational notes, e.g. declared but unused items.
    Note,
}

/// The item a [`Diagnostic`] is about.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum Subject {
    Forwarder,
    Input(String),
    Filter(String),
    Output(String),
    Pipeline(String),
}

impl Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forwarder => write!(f, "forwarder"),
            Self::Input(name) => write!(f, "input {name:?}"),
            Self::Filter(name) => write!(f, "filter {name:?}"),
            Self::Output(name) => write!(f, "output {name:?}"),
            Self::Pipeline(name) => write!(f, "pipeline {name:?}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub kind: Kind,
    pub subject: Subject,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            level,
            kind,
            subject,
            message,
        } = self;
        write!(f, "[{level}] {subject}: {message} ({kind})")
    }
}

/// An ordered collection of [`Diagnostic`]s, kept in the order they were raised.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: Level, kind: Kind, subject: Subject, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            level,
            kind,
            subject,
            message: message.into(),
        };

        match level {
            Level::Info => tracing::debug!(%diagnostic, "compiler note"),
            Level::Warn => tracing::warn!(%diagnostic, "compiler warning"),
            Level::Error => tracing::warn!(%diagnostic, "compiler error"),
        }

        self.0.push(diagnostic);
    }

    pub fn info(&mut self, kind: Kind, subject: Subject, message: impl Into<String>) {
        self.push(Level::Info, kind, subject, message);
    }

    pub fn warn(&mut self, kind: Kind, subject: Subject, message: impl Into<String>) {
        self.push(Level::Warn, kind, subject, message);
    }

    pub fn error(&mut self, kind: Kind, subject: Subject, message: impl Into<String>) {
        self.push(Level::Error, kind, subject, message);
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.level == Level::Error)
    }

    /// Returns `true` if an error was recorded for the given subject.
    pub fn has_errors_for(&self, subject: &Subject) -> bool {
        self.0
            .iter()
            .any(|d| d.level == Level::Error && &d.subject == subject)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.level == Level::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.level == Level::Warn)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type IntoIter = std::slice::Iter<'a, Diagnostic>;
    type Item = &'a Diagnostic;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_declaration_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(
            Kind::Ambiguous,
            Subject::Filter("a".to_owned()),
            "duplicate name",
        );
        diagnostics.error(
            Kind::SecretMissing,
            Subject::Output("es".to_owned()),
            "missing key",
        );
        diagnostics.info(Kind::Note, Subject::Input("b".to_owned()), "unused");

        let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![Kind::Ambiguous, Kind::SecretMissing, Kind::Note]
        );
        assert!(diagnostics.has_errors());
        assert!(diagnostics.has_errors_for(&Subject::Output("es".to_owned())));
        assert!(!diagnostics.has_errors_for(&Subject::Filter("a".to_owned())));
    }

    #[test]
    fn display_joins_entries() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(
            Kind::SchemaInvalid,
            Subject::Filter("f".to_owned()),
            "missing filter type",
        );
        diagnostics.warn(
            Kind::WildcardTooLoose,
            Subject::Filter("audit".to_owned()),
            "wildcard `*` matches everything",
        );

        assert_eq!(
            diagnostics.to_string(),
            "[error] filter \"f\": missing filter type (SchemaInvalid), \
             [warn] filter \"audit\": wildcard `*` matches everything (WildcardTooLoose)"
        );
    }
}
