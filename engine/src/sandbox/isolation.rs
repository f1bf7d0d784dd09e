//! Process-isolation runtime (`srt`): the agent command runs under a Node
//! wrapper driven by a JSON policy document instead of runner flags.

use serde::Serialize;

use crate::error::EngineError;
use crate::error::EngineResult;
use crate::shell::shell_escape_arg;
use crate::shell::shell_quote;
use crate::step::PipelineStep;
use crate::workflow::WILDCARD_DOMAIN;

pub const ISOLATION_PACKAGE: &str = "@anthropic-ai/sandbox-runtime";
pub const DEFAULT_ISOLATION_VERSION: &str = "0.0.23";
pub const POLICY_DIR: &str = "/tmp/gh-aw/sandbox-runtime";
pub const POLICY_PATH: &str = "/tmp/gh-aw/sandbox-runtime/settings.json";
const POLICY_HEREDOC: &str = "SRT_POLICY_EOF";

/// Policy document consumed by the isolation runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationPolicy {
    pub network: IsolationNetworkPolicy,
    pub filesystem: IsolationFilesystemPolicy,
    pub enable_weaker_nested_sandbox: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationNetworkPolicy {
    pub allowed_domains: Vec<String>,
    pub denied_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationFilesystemPolicy {
    pub deny_read: Vec<String>,
    pub allow_write: Vec<String>,
    pub deny_write: Vec<String>,
}

impl IsolationPolicy {
    pub fn new(allowed_domains: &[String], denied_domains: &[String]) -> Self {
        Self {
            network: IsolationNetworkPolicy {
                allowed_domains: allowed_domains
                    .iter()
                    .filter(|domain| domain.as_str() != WILDCARD_DOMAIN)
                    .cloned()
                    .collect(),
                denied_domains: denied_domains.to_vec(),
            },
            filesystem: IsolationFilesystemPolicy {
                deny_read: vec!["~/.ssh".to_string(), "~/.aws".to_string(), "~/.gnupg".to_string()],
                allow_write: vec![".".to_string(), "/tmp".to_string()],
                deny_write: vec![".git/hooks".to_string()],
            },
            enable_weaker_nested_sandbox: true,
        }
    }

    pub fn to_pretty_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| EngineError::render_json("isolation policy", err))
    }
}

pub fn isolation_install_step() -> PipelineStep {
    PipelineStep::builder("Install Sandbox Runtime")
        .run_line(format!(
            "npm install -g --silent {ISOLATION_PACKAGE}@{DEFAULT_ISOLATION_VERSION}"
        ))
        .build()
}

/// Command block lines: write the policy, then run `native_command` under the
/// runtime with output duplicated to `log_file`.
pub fn isolation_command_lines(
    policy: &IsolationPolicy,
    native_command: &str,
    log_file: &str,
) -> EngineResult<Vec<String>> {
    let document = policy.to_pretty_json()?;
    let mut lines = vec![
        format!("mkdir -p {POLICY_DIR}"),
        format!("cat > {POLICY_PATH} << '{POLICY_HEREDOC}'"),
    ];
    lines.extend(document.lines().map(str::to_string));
    lines.push(POLICY_HEREDOC.to_string());
    lines.push(format!(
        "node \"$(npm root -g)/{ISOLATION_PACKAGE}/dist/cli.js\" --settings {POLICY_PATH} {} 2>&1 | tee -a {}",
        shell_quote(native_command),
        shell_escape_arg(log_file)
    ));
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn policy_serializes_camel_case_and_drops_wildcard() {
        let policy = IsolationPolicy::new(
            &["*".to_string(), "example.com".to_string()],
            &["bad.example.com".to_string()],
        );
        let value = serde_json::to_value(&policy).expect("serializes");
        assert_eq!(
            value["network"]["allowedDomains"],
            serde_json::json!(["example.com"])
        );
        assert_eq!(
            value["network"]["deniedDomains"],
            serde_json::json!(["bad.example.com"])
        );
        assert_eq!(value["enableWeakerNestedSandbox"], serde_json::json!(true));
    }

    #[test]
    fn command_lines_embed_policy_heredoc() {
        let policy = IsolationPolicy::new(&["example.com".to_string()], &[]);
        let lines = isolation_command_lines(&policy, "codex exec 'hi'", "/tmp/a.log")
            .expect("renders");
        assert_eq!(lines[1], format!("cat > {POLICY_PATH} << 'SRT_POLICY_EOF'"));
        assert_eq!(lines[2], "{");
        assert!(lines.contains(&"SRT_POLICY_EOF".to_string()));
        let last = lines.last().expect("wrapper line");
        assert!(last.contains(r"'codex exec '\''hi'\'''"));
        assert!(last.ends_with("| tee -a /tmp/a.log"));
    }
}
