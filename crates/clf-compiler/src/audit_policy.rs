//! Lowers a Kubernetes API server audit policy into a VRL program.
//!
//! The program reads the audit event below a configurable root path. Rules become an if/else-if
//! cascade selecting the level of the event. `abort` drops the event, so the program must run in
//! a remap transform with `drop_on_abort` enabled.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::{
    model::{AuditLevel, AuditPolicy, GroupResources, PolicyRule},
    template::vrl_string,
    vrl::{join, raw_string},
};

/// Response codes dropped when a policy does not list any.
pub const DEFAULT_OMIT_RESPONSE_CODES: [i64; 4] = [404, 409, 422, 429];

/// Translates a wildcard into a regular expression.
///
/// A leading or trailing `*` matches any text, everything else, including interior `*`,
/// matches literally.
pub fn wildcard_regex(pattern: &str) -> String {
    if pattern == "*" {
        return ".*".to_owned();
    }
    let (prefix, rest) = match pattern.strip_prefix('*') {
        Some(rest) => (".*", rest),
        None => ("", pattern),
    };
    let (body, suffix) = match rest.strip_suffix('*') {
        Some(body) => (body, ".*"),
        None => (rest, ""),
    };
    format!("{prefix}{}{suffix}", regex::escape(body))
}

/// An anchored regular expression matching any of the wildcards.
pub fn match_any_regex<S: AsRef<str>>(patterns: &[S]) -> String {
    format!(
        "^({})$",
        patterns.iter().map(|p| wildcard_regex(p.as_ref())).join("|")
    )
}

/// Like [`match_any_regex`], but also accepts a query string after each match.
pub fn match_any_path_regex<S: AsRef<str>>(patterns: &[S]) -> String {
    format!(
        "^({})(\\?.*)?$",
        patterns.iter().map(|p| wildcard_regex(p.as_ref())).join("|")
    )
}

/// [`match_any_regex`] as a VRL regex literal, e.g. `r'^(.*a.*|b.*)$'`.
pub fn match_any<S: AsRef<str>>(patterns: &[S]) -> String {
    raw_string(&match_any_regex(patterns))
}

/// The lowered policy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lowered {
    pub program: String,

    /// Descriptions of selectors consisting of a lone `*`.
    pub loose_wildcards: Vec<String>,
}

/// Variables extracted from the event before the rule cascade runs.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Var {
    Stage,
    UserName,
    UserGroups,
    Verb,
    Namespace,
    ApiGroup,
    Resource,
    ResourceName,
    RequestUri,
}

impl Var {
    fn name(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::UserName => "user_name",
            Self::UserGroups => "user_groups",
            Self::Verb => "verb",
            Self::Namespace => "namespace",
            Self::ApiGroup => "api_group",
            Self::Resource => "resource",
            Self::ResourceName => "resource_name",
            Self::RequestUri => "request_uri",
        }
    }

    fn declaration(self, root: &str) -> String {
        let string_at = |path: &str| format!("{} = string({root}{path}) ?? \"\"", self.name());
        match self {
            Self::Stage => string_at(".stage"),
            Self::UserName => string_at(".user.username"),
            Self::UserGroups => format!("{} = array({root}.user.groups) ?? []", self.name()),
            Self::Verb => string_at(".verb"),
            Self::Namespace => string_at(".objectRef.namespace"),
            Self::ApiGroup => string_at(".objectRef.apiGroup"),
            Self::Resource => format!(
                "{}\nif is_string({root}.objectRef.subresource) {{ resource = resource + \"/\" + string!({root}.objectRef.subresource) }}",
                string_at(".objectRef.resource")
            ),
            Self::ResourceName => string_at(".objectRef.name"),
            Self::RequestUri => string_at(".requestURI"),
        }
    }
}

/// A rule after lowering its selectors into VRL conditions.
struct Branch {
    conditions: Vec<String>,
    level: AuditLevel,
    omit_stages: Vec<String>,
}

struct Lowering<'a> {
    root: &'a str,
    vars: BTreeSet<Var>,
    loose_wildcards: Vec<String>,
}

impl Lowering<'_> {
    fn var(&mut self, var: Var) -> &'static str {
        self.vars.insert(var);
        var.name()
    }

    fn matches(&mut self, var: Var, patterns: &[String], selector: &str) -> String {
        if patterns.iter().any(|p| p == "*") {
            self.loose_wildcards
                .push(format!("{selector} contains a lone \"*\" and matches everything"));
        }
        format!("match({}, {})", self.var(var), match_any(patterns))
    }

    fn group_resources(&mut self, resources: &GroupResources, selector: &str) -> String {
        let mut conditions = vec![format!(
            "{} == {}",
            self.var(Var::ApiGroup),
            vrl_string(resources.group.as_deref().unwrap_or_default())
        )];
        if !resources.resources.is_empty() {
            conditions.push(self.matches(
                Var::Resource,
                &resources.resources,
                &format!("{selector}.resources"),
            ));
        }
        if !resources.resource_names.is_empty() {
            conditions.push(self.matches(
                Var::ResourceName,
                &resources.resource_names,
                &format!("{selector}.resourceNames"),
            ));
        }
        conditions.join(" && ")
    }

    fn rule(&mut self, index: usize, rule: &PolicyRule) -> Branch {
        let selector = format!("rules[{index}]");
        let mut conditions = Vec::new();
        if !rule.users.is_empty() {
            conditions.push(self.matches(Var::UserName, &rule.users, &format!("{selector}.users")));
        }
        if !rule.user_groups.is_empty() {
            if rule.user_groups.iter().any(|p| p == "*") {
                self.loose_wildcards.push(format!(
                    "{selector}.userGroups contains a lone \"*\" and matches everything"
                ));
            }
            conditions.push(format!(
                "length(filter({}) -> |_index, group| {{ match(string(group) ?? \"\", {}) }}) > 0",
                self.var(Var::UserGroups),
                match_any(&rule.user_groups)
            ));
        }
        if !rule.verbs.is_empty() {
            conditions.push(self.matches(Var::Verb, &rule.verbs, &format!("{selector}.verbs")));
        }
        if !rule.resources.is_empty() {
            let alternatives = rule
                .resources
                .iter()
                .enumerate()
                .map(|(i, r)| self.group_resources(r, &format!("{selector}.resources[{i}]")))
                .collect::<Vec<_>>();
            let alternatives = if alternatives.len() == 1 {
                alternatives.join("")
            } else {
                format!("({})", alternatives.iter().map(|a| format!("({a})")).join(" || "))
            };
            conditions.push(format!("exists({}.objectRef) && {alternatives}", self.root));
        }
        if !rule.namespaces.is_empty() {
            conditions.push(self.matches(
                Var::Namespace,
                &rule.namespaces,
                &format!("{selector}.namespaces"),
            ));
        }
        if !rule.non_resource_urls.is_empty() {
            if rule.non_resource_urls.iter().any(|p| p == "*") {
                self.loose_wildcards.push(format!(
                    "{selector}.nonResourceURLs contains a lone \"*\" and matches everything"
                ));
            }
            let uri = self.var(Var::RequestUri);
            conditions.push(format!(
                "!exists({}.objectRef) && match({uri}, {})",
                self.root,
                raw_string(&match_any_path_regex(&rule.non_resource_urls))
            ));
        }
        if !rule.omit_stages.is_empty() {
            self.var(Var::Stage);
        }
        Branch {
            conditions,
            level: rule.level,
            omit_stages: rule.omit_stages.clone(),
        }
    }

    /// Drops OpenShift service account traffic and read-only system traffic, drops service
    /// account writes in the account's own namespace or to cluster scoped objects, records other
    /// system writes at `Request` and everything else at `RequestResponse`.
    fn default_rules(&mut self) -> Vec<Branch> {
        let user = self.var(Var::UserName);
        let verb = self.var(Var::Verb);
        let namespace = self.var(Var::Namespace);
        let branch = |conditions: Vec<String>, level| Branch {
            conditions,
            level,
            omit_stages: Vec::new(),
        };
        vec![
            branch(
                vec![format!(
                    "match({user}, {})",
                    match_any(&["system:serviceaccount:openshift-*"])
                )],
                AuditLevel::None,
            ),
            branch(
                vec![
                    format!("match({user}, {})", match_any(&["system:*"])),
                    format!("match({verb}, {})", match_any(&["get", "list", "watch"])),
                ],
                AuditLevel::None,
            ),
            branch(
                vec![
                    format!("match({user}, {})", match_any(&["system:serviceaccount:*"])),
                    format!(
                        "({namespace} == \"\" || starts_with({user}, \"system:serviceaccount:\" + {namespace} + \":\"))"
                    ),
                ],
                AuditLevel::None,
            ),
            branch(
                vec![format!("match({user}, {})", match_any(&["system:*"]))],
                AuditLevel::Request,
            ),
            branch(Vec::new(), AuditLevel::RequestResponse),
        ]
    }
}

fn stage_list(stages: &[String]) -> String {
    format!(
        "[{}]",
        stages.iter().unique().map(|s| vrl_string(s)).join(", ")
    )
}

fn cascade(branches: &[Branch]) -> String {
    let mut out = Vec::new();
    for (index, branch) in branches.iter().enumerate() {
        let mut body = vec![format!("  level = {}", vrl_string(branch.level.as_ref()))];
        if !branch.omit_stages.is_empty() {
            body.push(format!(
                "  if includes({}, stage) {{ abort }}",
                stage_list(&branch.omit_stages)
            ));
        }
        let body = body.join("\n");
        let catch_all = branch.conditions.is_empty();
        let head = match (index, catch_all) {
            (0, true) => "if true {".to_owned(),
            (0, false) => format!("if {} {{", branch.conditions.join(" && ")),
            (_, true) => "} else {".to_owned(),
            (_, false) => format!("}} else if {} {{", branch.conditions.join(" && ")),
        };
        out.push(head);
        out.push(body);
        if catch_all {
            break;
        }
    }
    if !out.is_empty() {
        out.push("}".to_owned());
    }
    out.join("\n")
}

/// Lowers `policy` into a program reading the event at `root`, e.g. `""` for the record root or
/// `._internal.structured`.
pub fn compile(policy: &AuditPolicy, root: &str) -> Lowered {
    let mut lowering = Lowering {
        root,
        vars: BTreeSet::new(),
        loose_wildcards: Vec::new(),
    };

    let branches = if policy.rules.is_empty() {
        lowering.default_rules()
    } else {
        policy
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| lowering.rule(index, rule))
            .collect()
    };
    if !policy.omit_stages.is_empty() {
        lowering.var(Var::Stage);
    }

    let mut fragments: Vec<String> = lowering
        .vars
        .iter()
        .map(|var| var.declaration(root))
        .collect();
    if !policy.omit_stages.is_empty() {
        fragments.push(format!(
            "if includes({}, stage) {{ abort }}",
            stage_list(&policy.omit_stages)
        ));
    }
    fragments.push("level = \"None\"".to_owned());
    fragments.push(cascade(&branches));
    fragments.push("if level == \"None\" { abort }".to_owned());
    fragments.push(format!(
        "if level == \"Metadata\" {{\n  del({root}.requestObject)\n  del({root}.responseObject)\n}}"
    ));
    fragments.push(format!(
        "if level == \"Request\" {{ del({root}.responseObject) }}"
    ));
    fragments.push(format!("{root}.level = level"));

    let omit_codes = policy
        .omit_response_codes
        .clone()
        .unwrap_or_else(|| DEFAULT_OMIT_RESPONSE_CODES.to_vec());
    if !omit_codes.is_empty() {
        fragments.push(format!(
            "if includes([{}], {root}.responseStatus.code) {{ abort }}",
            omit_codes.iter().join(", ")
        ));
    }

    Lowered {
        program: join(fragments),
        loose_wildcards: lowering.loose_wildcards,
    }
}
