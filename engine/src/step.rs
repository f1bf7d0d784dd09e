//! Structured pipeline steps rendered to indented text at the boundary.
//!
//! Engines build steps through [`StepBuilder`] and inspect the structured
//! fields directly; only the downstream serializer sees [`PipelineStep::lines`].

use std::collections::BTreeMap;

use serde::Serialize;

const ITEM_PREFIX: &str = "      - ";
const FIELD_INDENT: &str = "        ";
const NESTED_INDENT: &str = "          ";

/// One stage of the generated pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continue_on_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uses: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    with: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    run: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
}

impl PipelineStep {
    /// A step that renders to nothing.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn builder(name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(name)
    }

    pub fn is_noop(&self) -> bool {
        self.name.is_none() && self.id.is_none() && self.uses.is_none() && self.run.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn timeout_minutes(&self) -> Option<u32> {
        self.timeout_minutes
    }

    pub fn uses(&self) -> Option<&str> {
        self.uses.as_deref()
    }

    pub fn with_inputs(&self) -> &BTreeMap<String, String> {
        &self.with
    }

    pub fn run(&self) -> &[String] {
        &self.run
    }

    /// The command block joined into one script.
    pub fn script(&self) -> String {
        self.run.join("\n")
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Render the step as the indented lines the pipeline serializer embeds.
    pub fn lines(&self) -> Vec<String> {
        if self.is_noop() {
            return Vec::new();
        }

        let mut fields: Vec<String> = Vec::new();
        if let Some(name) = &self.name {
            fields.push(format!("name: {}", yaml_scalar(name)));
        }
        if let Some(id) = &self.id {
            fields.push(format!("id: {}", yaml_scalar(id)));
        }
        if let Some(condition) = &self.condition {
            fields.push(format!("if: {}", yaml_scalar(condition)));
        }
        if let Some(continue_on_error) = self.continue_on_error {
            fields.push(format!("continue-on-error: {continue_on_error}"));
        }
        if let Some(timeout) = self.timeout_minutes {
            fields.push(format!("timeout-minutes: {timeout}"));
        }
        if let Some(uses) = &self.uses {
            fields.push(format!("uses: {}", yaml_scalar(uses)));
        }

        let mut lines = Vec::new();
        for (index, field) in fields.into_iter().enumerate() {
            let prefix = if index == 0 { ITEM_PREFIX } else { FIELD_INDENT };
            lines.push(format!("{prefix}{field}"));
        }
        fn push_field(lines: &mut Vec<String>, field: &str) {
            let prefix = if lines.is_empty() {
                ITEM_PREFIX
            } else {
                FIELD_INDENT
            };
            lines.push(format!("{prefix}{field}"));
        }

        if !self.with.is_empty() {
            push_field(&mut lines, "with:");
            for (key, value) in &self.with {
                lines.push(format!("{NESTED_INDENT}{key}: {}", yaml_scalar(value)));
            }
        }
        if !self.run.is_empty() {
            // Content indentation must be explicit when the script itself
            // starts indented, or the block scalar guesses it from that line.
            let leading_indent = self
                .run
                .iter()
                .find(|line| !line.is_empty())
                .is_some_and(|line| line.starts_with([' ', '\t']));
            push_field(&mut lines, if leading_indent { "run: |2" } else { "run: |" });
            for line in &self.run {
                if line.is_empty() {
                    lines.push(String::new());
                } else {
                    lines.push(format!("{NESTED_INDENT}{line}"));
                }
            }
        }
        if !self.env.is_empty() {
            push_field(&mut lines, "env:");
            for (key, value) in &self.env {
                lines.push(format!("{NESTED_INDENT}{key}: {}", yaml_scalar(value)));
            }
        }
        lines
    }

    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepBuilder {
    step: PipelineStep,
}

impl StepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            step: PipelineStep {
                name: Some(name.into()),
                ..PipelineStep::default()
            },
        }
    }

    /// A step without a display name (user-declared custom steps may omit it).
    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.step.id = Some(id.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.step.condition = Some(condition.into());
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.step.continue_on_error = Some(continue_on_error);
        self
    }

    pub fn timeout_minutes(mut self, minutes: impl Into<Option<u32>>) -> Self {
        self.step.timeout_minutes = minutes.into();
        self
    }

    pub fn uses(mut self, action: impl Into<String>) -> Self {
        self.step.uses = Some(action.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.step.with.insert(key.into(), value.into());
        self
    }

    pub fn run_line(mut self, line: impl Into<String>) -> Self {
        self.step.run.push(line.into());
        self
    }

    pub fn run_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step.run.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Append a multi-line script, one block line per source line.
    pub fn script(mut self, script: &str) -> Self {
        self.step
            .run
            .extend(script.trim_end_matches('\n').lines().map(str::to_string));
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.step.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.step
            .env
            .extend(env.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    pub fn build(self) -> PipelineStep {
        self.step
    }
}

/// Render a YAML scalar, quoting only when a plain scalar would change meaning.
pub fn yaml_scalar(value: &str) -> String {
    if value.contains('\n') || value.contains('\r') || value.contains('\t') {
        return serde_json::Value::String(value.to_string()).to_string();
    }
    if needs_quotes(value) {
        return format!("'{}'", value.replace('\'', "''"));
    }
    value.to_string()
}

fn needs_quotes(value: &str) -> bool {
    if value.is_empty() || value.trim() != value {
        return true;
    }
    let lowered = value.to_ascii_lowercase();
    if matches!(
        lowered.as_str(),
        "true" | "false" | "yes" | "no" | "on" | "off" | "null" | "~" | "y" | "n"
    ) {
        return true;
    }
    if value.parse::<f64>().is_ok() || value.parse::<i64>().is_ok() {
        return true;
    }
    if value.starts_with("0x") || value.starts_with("0o") {
        return true;
    }
    let first = value.chars().next().unwrap_or(' ');
    if matches!(
        first,
        '-' | '?' | ':' | ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\''
            | '"' | '%' | '@' | '`'
    ) {
        return true;
    }
    value.contains(": ") || value.contains(" #") || value.ends_with(':')
}
