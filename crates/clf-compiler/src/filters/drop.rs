//! The drop filter.
//!
//! Each test is a conjunction of regular expression conditions. Records passing any test are
//! dropped, so the emitted `filter` transform keeps records for which the disjunction of all tests
//! is false. Regular expressions are used verbatim.

use regex::Regex;
use snafu::{ResultExt, ensure};

use super::{
    AmbiguousConditionSnafu, EmptyTestSnafu, InvalidRegexSnafu, Result, field_value, parse_path,
};
use crate::{
    config::{Component, Value},
    model::{DropCondition, DropTest},
    vrl::raw_string,
};

fn condition(test: usize, condition: &DropCondition) -> Result<String> {
    let path = parse_path(&condition.field)?;
    let (pattern, negated) = match (&condition.matches, &condition.not_matches) {
        (Some(pattern), None) => (pattern, false),
        (None, Some(pattern)) => (pattern, true),
        _ => {
            return AmbiguousConditionSnafu {
                field: &condition.field,
                test,
            }
            .fail();
        }
    };
    Regex::new(pattern).context(InvalidRegexSnafu {
        field: &condition.field,
        test,
    })?;

    let matched = format!(
        "match(to_string({}) ?? \"\", {})",
        field_value(&path),
        raw_string(pattern)
    );
    Ok(if negated { format!("!{matched}") } else { matched })
}

/// The VRL condition of records passing any of `tests`.
pub fn matches_any(tests: &[DropTest]) -> Result<String> {
    let tests = tests
        .iter()
        .enumerate()
        .map(|(index, test)| -> Result<String> {
            ensure!(!test.test.is_empty(), EmptyTestSnafu { test: index });
            let conditions = test
                .test
                .iter()
                .map(|c| condition(index, c))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", conditions.join(" && ")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(tests.join(" || "))
}

/// A `filter` transform dropping the records which pass any of `tests`.
pub fn build(tests: &[DropTest], id: &str, inputs: Vec<String>) -> Result<Component> {
    let condition = format!("!({})", matches_any(tests)?);
    Ok(Component::transform(id, "filter", inputs).with("condition", Value::Vrl(condition)))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{config::Config, filters::Error};

    fn tests(yaml: &str) -> Vec<DropTest> {
        serde_yaml::from_str(yaml).expect("valid drop tests")
    }

    #[test]
    fn drops_records_matching_any_test() {
        let tests = tests(indoc! {"
            - test:
                - field: .message
                  matches: error
            - test:
                - field: .message
                  notMatches: information
                - field: .message
                  matches: debug
        "});
        let component = build(&tests, "pipeline_p_drop_0", vec!["input_a_container_meta".to_owned()])
            .expect("drop filter builds");
        let mut config = Config::new();
        config.push(component);

        assert_eq!(
            config.render(),
            indoc! {r#"
                [transforms.pipeline_p_drop_0]
                type = "filter"
                inputs = ["input_a_container_meta"]
                condition = '''
                  !((match(to_string(._internal.message || ._internal.structured.message) ?? "", r'error')) || (!match(to_string(._internal.message || ._internal.structured.message) ?? "", r'information') && match(to_string(._internal.message || ._internal.structured.message) ?? "", r'debug')))
                '''
            "#}
        );
    }

    #[test]
    fn uses_regular_expressions_verbatim() {
        let tests = tests(indoc! {r#"
            - test:
                - field: .kubernetes.namespace_labels."test-dashes/slashes"
                  matches: '^(very|quite)-important$'
        "#});
        let condition = matches_any(&tests).expect("condition builds");
        assert!(condition.contains(r"r'^(very|quite)-important$'"));
        assert!(condition.contains(r#"._internal.kubernetes.namespace_labels."test-dashes/slashes""#));
    }

    #[test]
    fn rejects_invalid_tests() {
        let invalid = [
            (
                "- test: []",
                "test 0 must not be empty",
            ),
            (
                "- test: [{field: .message, matches: a, notMatches: b}]",
                "condition on \".message\" in test 0 must set exactly one of matches and notMatches",
            ),
            (
                "- test: [{field: .message, matches: '(unclosed'}]",
                "condition on \".message\" in test 0 has an invalid regular expression",
            ),
            (
                "- test: [{field: message, matches: a}]",
                "invalid field \"message\"",
            ),
        ];
        for (yaml, message) in invalid {
            let error: Error = matches_any(&tests(yaml)).expect_err("tests are invalid");
            assert_eq!(error.to_string(), message);
        }
    }
}
