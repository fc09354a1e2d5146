//! Applies an audit policy to API server audit events. Other records pass unchanged.

use super::PipelineFilter;
use crate::{
    audit_policy,
    config::Component,
    model::AuditPolicy,
    vrl::{viaq::LogSource, when},
};

const EVENT_ROOT: &str = "._internal.structured";

fn is_api_server_event() -> String {
    format!(
        "{} || {}",
        LogSource::KubeApi.condition(),
        LogSource::OpenshiftApi.condition()
    )
}

/// A remap transform which drops the events the policy rejects.
pub fn build(policy: &AuditPolicy, id: &str, inputs: Vec<String>) -> PipelineFilter {
    let lowered = audit_policy::compile(policy, EVENT_ROOT);
    let program = when(&is_api_server_event(), &lowered.program);
    let component = Component::remap(id, inputs, program).with("drop_on_abort", true);

    PipelineFilter {
        id: id.to_owned(),
        components: vec![component],
        warnings: lowered.loose_wildcards,
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{config::Value, vrl::check};

    #[test]
    fn filters_only_api_server_events() {
        let policy: AuditPolicy = serde_yaml::from_str(indoc! {"
            rules:
              - level: Metadata
                verbs: ['*']
        "})
        .expect("valid policy");
        let built = build(&policy, "pipeline_p_audit_0", vec!["input_a_kubeapi_meta".to_owned()]);
        let component = &built.components[0];
        let program = component.vrl().expect("remap carries a program");

        assert!(program.starts_with(
            r#"if ._internal.log_source == "kubeAPI" || ._internal.log_source == "openshiftAPI" {
  verb = string(._internal.structured.verb) ?? """#
        ));
        assert!(program.contains("\n  ._internal.structured.level = level\n"));
        assert!(program.ends_with("{ abort }\n}"));
        assert_eq!(component.table.get("drop_on_abort"), Some(&Value::Boolean(true)));
        assert_eq!(check(program), Ok(()));
        assert_eq!(
            built.warnings,
            vec!["rules[0].verbs contains a lone \"*\" and matches everything"]
        );
    }
}
