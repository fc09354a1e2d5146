//! An in-memory representation of the rendered collector configuration and its deterministic
//! TOML serializer.
//!
//! Every component is a [`Component`] holding a [`Table`]. Tables keep their keys in
//! [`BTreeMap`]s, so rendering the same set of components always yields the same text.
//! The only exceptions to lexicographic key order are `type` and `inputs`, which are always
//! written first (in that order).

use std::{
    collections::BTreeMap,
    fmt::{Display, Write},
};

use strum::{AsRefStr, Display as StrumDisplay, EnumIter};

use crate::constants::{SECRET_BACKEND_NAME, SECRET_BASE_PATH, SECRET_TOKEN_PREFIX};

/// The three kinds of collector components.
///
/// The declaration order is the order in which components are rendered.
#[derive(
    AsRefStr, Clone, Copy, Debug, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd, StrumDisplay,
)]
#[strum(serialize_all = "lowercase")]
pub enum ComponentKind {
    Sources,
    Transforms,
    Sinks,
}

/// A single value of a configuration key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    Array(Vec<Value>),

    /// A mapping rendered inline as `{key = value, ...}` with sorted keys.
    InlineTable(BTreeMap<String, Value>),

    /// A VRL program, rendered as a `'''` multi-line string.
    Vrl(String),
}

impl Value {
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(items.into_iter().map(|s| Self::String(s.into())).collect())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::InlineTable(value)
    }
}

/// A TOML table with nested subtables.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Table {
    entries: BTreeMap<String, Value>,
    tables: BTreeMap<String, Table>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Table::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder-style variant of [`Table::insert_table`].
    pub fn with_table(mut self, name: impl Into<String>, table: Self) -> Self {
        self.insert_table(name, table);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Inserts a subtable, merging it into an already existing one with the same name.
    pub fn insert_table(&mut self, name: impl Into<String>, table: Self) -> &mut Self {
        let existing = self.tables.entry(name.into()).or_default();
        existing.entries.extend(table.entries);
        for (name, sub) in table.tables {
            existing.insert_table(name, sub);
        }
        self
    }

    /// Returns the subtable with the given name, creating it if it does not exist yet.
    pub fn table_mut(&mut self, name: impl Into<String>) -> &mut Self {
        self.tables.entry(name.into()).or_default()
    }

    pub fn remove_table(&mut self, name: &str) -> Option<Self> {
        self.tables.remove(name)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn table(&self, name: &str) -> Option<&Self> {
        self.tables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.tables.values().all(Self::is_empty)
    }

    fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        Box::new(
            self.entries
                .values()
                .chain(self.tables.values().flat_map(Self::values)),
        )
    }
}

/// A single source, transform or sink of the collector configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    pub id: String,
    pub component_type: String,
    pub inputs: Vec<String>,
    pub description: Option<String>,
    pub table: Table,
}

impl Component {
    pub fn source(id: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self::new(ComponentKind::Sources, id, component_type, Vec::new())
    }

    pub fn transform(
        id: impl Into<String>,
        component_type: impl Into<String>,
        inputs: Vec<String>,
    ) -> Self {
        Self::new(ComponentKind::Transforms, id, component_type, inputs)
    }

    /// A `remap` transform running the given VRL program.
    pub fn remap(id: impl Into<String>, inputs: Vec<String>, vrl: impl Into<String>) -> Self {
        Self::transform(id, "remap", inputs).with("source", Value::Vrl(vrl.into()))
    }

    pub fn sink(
        id: impl Into<String>,
        component_type: impl Into<String>,
        inputs: Vec<String>,
    ) -> Self {
        Self::new(ComponentKind::Sinks, id, component_type, inputs)
    }

    fn new(
        kind: ComponentKind,
        id: impl Into<String>,
        component_type: impl Into<String>,
        inputs: Vec<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            component_type: component_type.into(),
            inputs,
            description: None,
            table: Table::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.table.insert(key, value);
        self
    }

    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.table.insert_table(name, table);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the VRL program of a remap transform, if any.
    pub fn vrl(&self) -> Option<&str> {
        match self.table.get("source") {
            Some(Value::Vrl(vrl)) => Some(vrl),
            _ => None,
        }
    }

    fn contains_secret_token(&self) -> bool {
        self.table.values().any(value_contains_secret_token)
    }

    fn render(&self, out: &mut String) {
        if let Some(description) = &self.description {
            let _ = writeln!(out, "# {description}");
        }

        let path = format!("{kind}.{id}", kind = self.kind, id = quote_key(&self.id));
        let _ = writeln!(out, "[{path}]");
        let _ = writeln!(out, "type = {}", quote_string(&self.component_type));

        if self.kind != ComponentKind::Sources {
            let mut inputs = self.inputs.clone();
            inputs.sort();
            inputs.dedup();
            let inputs = Value::strings(inputs);
            let _ = writeln!(out, "inputs = {}", render_inline(&inputs));
        }

        render_entries(&self.table, out);
        render_subtables(&self.table, &path, out);
    }
}

fn render_entries(table: &Table, out: &mut String) {
    for (key, value) in &table.entries {
        let _ = writeln!(out, "{key} = {value}", key = quote_key(key), value = render_value(value));
    }
}

fn render_subtables(table: &Table, path: &str, out: &mut String) {
    for (name, sub) in &table.tables {
        if sub.is_empty() {
            continue;
        }
        let path = format!("{path}.{name}", name = quote_key(name));
        if !sub.entries.is_empty() {
            let _ = writeln!(out, "\n[{path}]");
            render_entries(sub, out);
        }
        render_subtables(sub, &path, out);
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Vrl(vrl) => render_vrl(vrl),
        other => render_inline(other),
    }
}

fn render_inline(value: &Value) -> String {
    match value {
        Value::String(s) => quote_string(s),
        Value::Integer(i) => i.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(render_inline).collect();
            format!("[{}]", items.join(","))
        }
        Value::InlineTable(map) => {
            let items: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{k} = {v}", k = quote_key(k), v = render_inline(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        Value::Vrl(vrl) => quote_string(vrl),
    }
}

/// Renders a VRL program as a `'''` multi-line literal, indenting every line by two spaces.
fn render_vrl(vrl: &str) -> String {
    let mut out = String::from("'''\n");
    let lines: Vec<&str> = vrl.lines().map(str::trim_end).collect();
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);

    let mut previous_blank = false;
    for line in &lines[start..end] {
        if line.is_empty() {
            if !previous_blank {
                out.push('\n');
            }
            previous_blank = true;
            continue;
        }
        previous_blank = false;
        let _ = writeln!(out, "  {line}");
    }
    out.push_str("'''");
    out
}

fn is_bare_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn quote_key(key: &str) -> String {
    if is_bare_key(key) {
        key.to_owned()
    } else {
        quote_string(key)
    }
}

/// Quotes a string as a TOML basic string.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn value_contains_secret_token(value: &Value) -> bool {
    match value {
        Value::String(s) | Value::Vrl(s) => s.contains(SECRET_TOKEN_PREFIX),
        Value::Array(items) => items.iter().any(value_contains_secret_token),
        Value::InlineTable(map) => map.values().any(value_contains_secret_token),
        Value::Integer(_) | Value::Boolean(_) => false,
    }
}

/// The complete collector configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    components: Vec<Component>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `component`, keeping an already present component with the same ID instead.
    ///
    /// Returns whether `component` was added.
    pub fn push(&mut self, component: Component) -> bool {
        if self.contains(&component.id) {
            return false;
        }
        self.components.push(component);
        true
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.component(id).is_some()
    }

    pub fn sinks(&self) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(|c| c.kind == ComponentKind::Sinks)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Renders the configuration as TOML.
    ///
    /// Components are ordered by kind (sources, transforms, sinks) and then by ID.
    pub fn render(&self) -> String {
        let mut components: Vec<&Component> = self.components.iter().collect();
        components.sort_by(|a, b| (a.kind, &a.id).cmp(&(b.kind, &b.id)));

        let mut out = String::new();
        for component in components {
            if !out.is_empty() {
                out.push('\n');
            }
            component.render(&mut out);
        }

        if self.components.iter().any(Component::contains_secret_token) {
            let _ = write!(
                out,
                "\n[secret.{SECRET_BACKEND_NAME}]\ntype = \"file\"\nbase_path = {}\n",
                quote_string(SECRET_BASE_PATH)
            );
        }

        out
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    #[test]
    fn renders_type_and_inputs_first() {
        let sink = Component::sink(
            "output_es",
            "elasticsearch",
            vec!["pipeline_b_viaq_0".to_owned(), "pipeline_a_viaq_0".to_owned()],
        )
        .with("endpoints", Value::strings(["https://es:9200"]))
        .with("api_version", "v8")
        .with_table(
            "bulk",
            Table::new().with("action", "create").with("index", "{{ _internal.es_index }}"),
        );

        let mut config = Config::new();
        config.push(sink);

        assert_eq!(
            config.render(),
            indoc! {r#"
                [sinks.output_es]
                type = "elasticsearch"
                inputs = ["pipeline_a_viaq_0","pipeline_b_viaq_0"]
                api_version = "v8"
                endpoints = ["https://es:9200"]

                [sinks.output_es.bulk]
                action = "create"
                index = "{{ _internal.es_index }}"
            "#}
        );
    }

    #[test]
    fn renders_vrl_indented() {
        let mut config = Config::new();
        config.push(
            Component::remap("t", vec!["s".to_owned()], "\n.a = 1\n\n\nif true {\n  .b = 2\n}\n")
                .describe("Set fields"),
        );

        assert_eq!(
            config.render(),
            indoc! {r#"
                # Set fields
                [transforms.t]
                type = "remap"
                inputs = ["s"]
                source = '''
                  .a = 1

                  if true {
                    .b = 2
                  }
                '''
            "#}
        );
    }

    #[test]
    fn orders_components_by_kind_then_id() {
        let mut config = Config::new();
        config.push(Component::sink("a_sink", "console", vec!["b".to_owned()]));
        config.push(Component::transform("b", "remap", vec!["z_source".to_owned()]));
        config.push(Component::source("z_source", "journald"));

        let rendered = config.render();
        let source = rendered.find("[sources.z_source]").expect("source rendered");
        let transform = rendered.find("[transforms.b]").expect("transform rendered");
        let sink = rendered.find("[sinks.a_sink]").expect("sink rendered");
        assert!(source < transform && transform < sink);
    }

    #[test]
    fn keeps_the_first_component_of_an_id() {
        let mut config = Config::new();
        assert!(config.push(Component::source("input_a_container", "kubernetes_logs")));
        assert!(!config.push(Component::source("input_a_container", "syslog")));

        assert_eq!(config.components().len(), 1);
        assert_eq!(
            config.component("input_a_container").map(|c| c.component_type.as_str()),
            Some("kubernetes_logs")
        );
    }

    #[test]
    fn emits_secret_backend_only_when_needed() {
        let mut config = Config::new();
        config.push(Component::sink("s", "http", vec!["i".to_owned()]));
        assert!(!config.render().contains("[secret.kubernetes_secret]"));

        config.push(
            Component::sink("t", "http", vec!["i".to_owned()]).with_table(
                "auth",
                Table::new().with("password", "SECRET[kubernetes_secret.es/password]"),
            ),
        );
        assert!(config.render().ends_with(indoc! {r#"
            [secret.kubernetes_secret]
            type = "file"
            base_path = "/collector/secrets"
        "#}));
    }

    #[rstest]
    #[case("plain", "\"plain\"")]
    #[case("with \"quotes\"", r#""with \"quotes\"""#)]
    #[case(r"back\slash", r#""back\\slash""#)]
    #[case("line\nbreak", r#""line\nbreak""#)]
    fn quotes_strings(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(quote_string(input), expected);
    }

    #[test]
    fn renders_inline_tables_and_quoted_keys() {
        let mut map = BTreeMap::new();
        map.insert("b".to_owned(), Value::Integer(2));
        map.insert("a.b".to_owned(), Value::Boolean(true));

        let mut config = Config::new();
        config.push(
            Component::transform("r", "route", vec!["i".to_owned()])
                .with("route", map)
                .with("merge", Value::Array(vec![Value::Integer(1), "x".into()])),
        );

        let rendered = config.render();
        assert!(rendered.contains(r#"route = {"a.b" = true, b = 2}"#));
        assert!(rendered.contains(r#"merge = [1,"x"]"#));
    }

    #[test]
    fn skips_empty_subtables() {
        let mut config = Config::new();
        config.push(
            Component::sink("s", "console", vec!["i".to_owned()])
                .with_table("buffer", Table::new())
                .with_table("encoding", Table::new().with("codec", "json")),
        );

        let rendered = config.render();
        assert!(!rendered.contains("[sinks.s.buffer]"));
        assert!(rendered.contains("[sinks.s.encoding]\ncodec = \"json\""));
    }
}
