//! Building blocks of the VRL programs embedded in remap and filter transforms.
//!
//! Programs are assembled from constant fragments. Nothing here parses VRL, [`check`] only
//! catches the structural mistakes that would break the surrounding TOML or the program itself.

use snafu::{Snafu, ensure};

pub mod audit;
pub mod journal;
pub mod viaq;

#[derive(Debug, Eq, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("program contains a triple quote"))]
    TripleQuote,

    #[snafu(display("unexpected {found:?} on line {line}"))]
    UnexpectedClose { found: char, line: usize },

    #[snafu(display("expected {expected:?} on line {line}, found {found:?}"))]
    MismatchedClose {
        expected: char,
        found: char,
        line: usize,
    },

    #[snafu(display("{open:?} opened on line {line} is never closed"))]
    Unclosed { open: char, line: usize },

    #[snafu(display("string literal starting on line {line} is never terminated"))]
    UnterminatedString { line: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, PartialEq)]
enum State {
    Code,
    Comment,
    String { quote: char, line: usize },
}

/// Checks that braces, brackets and parentheses are balanced outside of string literals and
/// comments, and that the program can be embedded in a TOML multi-line literal.
pub fn check(program: &str) -> Result<()> {
    ensure!(!program.contains("'''"), TripleQuoteSnafu);

    let mut state = State::Code;
    let mut open: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut chars = program.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Comment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::String { quote, .. } => match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        line += 1;
                    }
                }
                c if c == quote => state = State::Code,
                _ => {}
            },
            State::Code => match c {
                '#' => state = State::Comment,
                '"' | '\'' => state = State::String { quote: c, line },
                '{' | '[' | '(' => open.push((c, line)),
                '}' | ']' | ')' => {
                    let expected = match c {
                        '}' => '{',
                        ']' => '[',
                        _ => '(',
                    };
                    match open.pop() {
                        None => return UnexpectedCloseSnafu { found: c, line }.fail(),
                        Some((o, _)) if o != expected => {
                            return MismatchedCloseSnafu {
                                expected: closing(o),
                                found: c,
                                line,
                            }
                            .fail();
                        }
                        Some(_) => {}
                    }
                }
                _ => {}
            },
        }
        if c == '\n' {
            line += 1;
        }
    }

    if let State::String { line, .. } = state {
        return UnterminatedStringSnafu { line }.fail();
    }
    match open.pop() {
        Some((open, line)) => UnclosedSnafu { open, line }.fail(),
        None => Ok(()),
    }
}

fn closing(open: char) -> char {
    match open {
        '{' => '}',
        '[' => ']',
        _ => ')',
    }
}

/// Joins fragments with newlines, trimming each and skipping empty ones.
pub fn join<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .filter_map(|f| {
            let f = f.as_ref().trim();
            (!f.is_empty()).then(|| f.to_owned())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wraps `body` in an `if condition { ... }` block, indenting the body.
pub fn when(condition: &str, body: &str) -> String {
    let body = body
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("  {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("if {condition} {{\n{body}\n}}")
}

/// Renders `text` as a VRL raw string literal, e.g. a regular expression.
pub fn raw_string(text: &str) -> String {
    format!("r'{}'", text.replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(".a = 1")]
    #[case("if exists(.a) { .b = [1, 2] }")]
    #[case(r#"if match!(.message, r'^EM[0-9]+|(?i)\b(?:info)\b') { .level = "emergency" }"#)]
    #[case(".a = \"}{\" # comment with ( unbalanced\n.b = {}")]
    #[case(r#".a = "escaped \" quote {""#)]
    #[case(r#"replace(key, r'[\./]', "_")"#)]
    fn accepts_balanced_programs(#[case] program: &str) {
        assert_eq!(check(program), Ok(()));
    }

    #[rstest]
    #[case("if true { .a = 1", Error::Unclosed { open: '{', line: 1 })]
    #[case(".a = 1\n}", Error::UnexpectedClose { found: '}', line: 2 })]
    #[case("f(.a]", Error::MismatchedClose { expected: ')', found: ']', line: 1 })]
    #[case(".a = \"open", Error::UnterminatedString { line: 1 })]
    #[case(".a = '''x'''", Error::TripleQuote)]
    fn rejects_broken_programs(#[case] program: &str, #[case] error: Error) {
        assert_eq!(check(program), Err(error));
    }

    #[test]
    fn joins_and_wraps() {
        let body = join(["  .a = 1  ", "", "\n.b = 2\n"]);
        assert_eq!(body, ".a = 1\n.b = 2");
        assert_eq!(
            when(".x == 1", &body),
            indoc! {"
                if .x == 1 {
                  .a = 1
                  .b = 2
                }"}
        );
    }

    #[test]
    fn escapes_raw_strings() {
        assert_eq!(raw_string("^it's$"), r"r'^it\'s$'");
    }
}
