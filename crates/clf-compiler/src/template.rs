//! User templates for dynamic output values.
//!
//! A template mixes literal text with expressions in braces:
//!
//! - `{.path||.other||"fallback"}` reads the first existing record field, falling back to a
//!   literal. Without a literal fallback, the record is dropped by the collector when none of
//!   the fields exist.
//! - `{@timestamp|<format>}` formats the record timestamp, where `<format>` is one of `date`,
//!   `year`, `month`, `day`, `hour`, `minute`, `datetime` or `strftime:"<pattern>"`.
//!
//! `app-{.kubernetes.namespace_name||"none"}` expands to the VRL expression
//! `"app-" + (to_string(._internal.kubernetes.namespace_name || "none") ?? "none")`.

use std::fmt::Display;

use snafu::{ResultExt, Snafu, ensure};

use crate::{constants::INTERNAL_FIELD, field_path::FieldPath};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("template {template:?} contains an unterminated '{{'"))]
    Unterminated { template: String },

    #[snafu(display("template {template:?} contains an unmatched '}}'"))]
    UnmatchedClose { template: String },

    #[snafu(display("template {template:?} contains an empty expression"))]
    EmptyExpression { template: String },

    #[snafu(display("template {template:?} contains an empty fallback"))]
    EmptyFallback { template: String },

    #[snafu(display("template {template:?} contains an invalid field path"))]
    InvalidPath {
        source: crate::field_path::Error,
        template: String,
    },

    #[snafu(display("template {template:?} uses the unknown timestamp format {format:?}"))]
    UnknownTimestampFormat { template: String, format: String },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Part {
    Literal(String),
    Field {
        paths: Vec<FieldPath>,
        fallback: Option<String>,
    },
    Timestamp {
        format: String,
    },
}

/// A parsed user template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(template: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            match c {
                '{' => {
                    let end = find_close(rest).ok_or_else(|| {
                        UnterminatedSnafu { template }.build()
                    })?;
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(parse_expression(template, &rest[1..end])?);
                    rest = &rest[end + 1..];
                }
                '}' => return UnmatchedCloseSnafu { template }.fail(),
                c => {
                    literal.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self { parts })
    }

    /// Returns `true` if the template reads anything from the record.
    pub fn is_dynamic(&self) -> bool {
        self.parts.iter().any(|p| !matches!(p, Part::Literal(_)))
    }

    /// The VRL expression evaluating the template for the current record.
    pub fn to_vrl(&self) -> String {
        if self.parts.is_empty() {
            return "\"\"".to_owned();
        }
        self.parts
            .iter()
            .map(|part| match part {
                Part::Literal(text) => vrl_string(text),
                Part::Field { paths, fallback } => {
                    let mut alternatives: Vec<String> = paths
                        .iter()
                        .map(|p| p.under(&format!(".{INTERNAL_FIELD}")))
                        .collect();
                    match fallback {
                        Some(fallback) => {
                            let fallback = vrl_string(fallback);
                            alternatives.push(fallback.clone());
                            format!(
                                "(to_string({alternatives}) ?? {fallback})",
                                alternatives = alternatives.join(" || ")
                            )
                        }
                        None => format!("to_string!({})", alternatives.join(" || ")),
                    }
                }
                Part::Timestamp { format } => format!(
                    "format_timestamp!(.{INTERNAL_FIELD}.timestamp || now(), format: {})",
                    vrl_string(format)
                ),
            })
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_vrl())
    }
}

/// Finds the index of the `}` closing the `{` at the start of `s`, skipping quoted text.
fn find_close(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            '"' => in_quotes = !in_quotes,
            '}' if !in_quotes => return Some(i),
            '{' if !in_quotes => return None,
            _ => {}
        }
    }
    None
}

fn parse_expression(template: &str, expression: &str) -> Result<Part> {
    let expression = expression.trim();
    ensure!(!expression.is_empty(), EmptyExpressionSnafu { template });

    if let Some(format) = expression.strip_prefix("@timestamp|") {
        return timestamp_format(format)
            .map(|format| Part::Timestamp { format })
            .ok_or_else(|| {
                UnknownTimestampFormatSnafu { template, format }.build()
            });
    }

    let mut paths = Vec::new();
    let mut fallback = None;
    for alternative in split_alternatives(expression) {
        let alternative = alternative.trim();
        ensure!(fallback.is_none(), EmptyFallbackSnafu { template });

        if let Some(quoted) = alternative
            .strip_prefix('"')
            .and_then(|a| a.strip_suffix('"'))
        {
            ensure!(!quoted.is_empty(), EmptyFallbackSnafu { template });
            fallback = Some(quoted.to_owned());
        } else {
            ensure!(!alternative.is_empty(), EmptyFallbackSnafu { template });
            paths.push(
                alternative
                    .parse::<FieldPath>()
                    .context(InvalidPathSnafu { template })?,
            );
        }
    }
    ensure!(!paths.is_empty(), EmptyExpressionSnafu { template });

    Ok(Part::Field { paths, fallback })
}

/// Splits on `||` outside of double quotes.
fn split_alternatives(expression: &str) -> Vec<&str> {
    let mut alternatives = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = expression.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'|' if !in_quotes && bytes.get(i + 1) == Some(&b'|') => {
                alternatives.push(&expression[start..i]);
                start = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    alternatives.push(&expression[start..]);
    alternatives
}

fn timestamp_format(format: &str) -> Option<String> {
    let format = match format.trim() {
        "date" => "%Y-%m-%d",
        "year" => "%Y",
        "month" => "%m",
        "day" => "%d",
        "hour" => "%H",
        "minute" => "%M",
        "datetime" => "%Y-%m-%d_%H-%M-%S",
        other => {
            return other
                .strip_prefix("strftime:\"")
                .and_then(|f| f.strip_suffix('"'))
                .filter(|f| !f.is_empty())
                .map(ToOwned::to_owned);
        }
    };
    Some(format.to_owned())
}

/// Quotes text as a VRL string literal.
pub fn vrl_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("application", r#""application""#)]
    #[case(
        r#"{.log_type||"none"}"#,
        r#"(to_string(._internal.log_type || "none") ?? "none")"#
    )]
    #[case(
        r#"app-{.kubernetes.namespace_name||"none"}-logs"#,
        r#""app-" + (to_string(._internal.kubernetes.namespace_name || "none") ?? "none") + "-logs""#
    )]
    #[case(
        r#"{.kubernetes.labels."app.io/name"||.log_type||"x"}"#,
        r#"(to_string(._internal.kubernetes.labels."app.io/name" || ._internal.log_type || "x") ?? "x")"#
    )]
    #[case("{.log_type}", "to_string!(._internal.log_type)")]
    #[case(
        "logs-{@timestamp|date}",
        r#""logs-" + format_timestamp!(._internal.timestamp || now(), format: "%Y-%m-%d")"#
    )]
    #[case(
        r#"{@timestamp|strftime:"%Y/%m"}"#,
        r#"format_timestamp!(._internal.timestamp || now(), format: "%Y/%m")"#
    )]
    fn expands_templates(#[case] input: &str, #[case] expected: &str) {
        let template = Template::parse(input).expect("template is valid");
        assert_eq!(template.to_vrl(), expected);
    }

    #[rstest]
    #[case("foo-{.log_type", Error::Unterminated { template: "foo-{.log_type".to_owned() })]
    #[case("foo}", Error::UnmatchedClose { template: "foo}".to_owned() })]
    #[case("{}", Error::EmptyExpression { template: "{}".to_owned() })]
    #[case(r#"{.log_type||""}"#, Error::EmptyFallback { template: r#"{.log_type||""}"#.to_owned() })]
    #[case(r#"{.log_type||}"#, Error::EmptyFallback { template: r#"{.log_type||}"#.to_owned() })]
    #[case(
        "{@timestamp|week}",
        Error::UnknownTimestampFormat { template: "{@timestamp|week}".to_owned(), format: "week".to_owned() }
    )]
    fn rejects_invalid_templates(#[case] input: &str, #[case] expected: Error) {
        assert_eq!(Template::parse(input), Err(expected));
    }

    #[test]
    fn rejects_invalid_paths() {
        let error = Template::parse("{log_type}").expect_err("path without leading dot");
        assert!(matches!(error, Error::InvalidPath { .. }));
    }

    #[test]
    fn literal_templates_are_static() {
        assert!(!Template::parse("audit").expect("valid").is_dynamic());
        assert!(Template::parse("{.a}").expect("valid").is_dynamic());
    }
}
