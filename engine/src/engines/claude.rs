use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::Engine;
use crate::engines::common;
use crate::engines::common::CliPackage;
use crate::engines::common::EngineProfile;
use crate::engines::common::ExecutionPlan;
use crate::engines::common::NativeCommand;
use crate::error::EngineResult;
use crate::logs;
use crate::logs::LogMetrics;
use crate::mcp;
use crate::mcp::McpConfigFormat;
use crate::mcp::ResolvedMcpServers;
use crate::sandbox::domains;
use crate::secrets;
use crate::shell::shell_escape_arg;
use crate::spec::EngineCapabilities;
use crate::spec::EngineSpec;
use crate::step::PipelineStep;
use crate::traits::AgenticEngine;
use crate::traits::LogParser;
use crate::traits::McpConfigProvider;
use crate::traits::SecurityProvider;
use crate::traits::WorkflowExecutor;
use crate::workflow::WorkflowSpec;

pub const CLAUDE_CLI: CliPackage = CliPackage {
    package: "@anthropic-ai/claude-code",
    version: "2.0.62",
    binary: "claude",
};
pub const CLAUDE_CREDENTIALS: &[&str] = &["ANTHROPIC_API_KEY", "CLAUDE_CODE_OAUTH_TOKEN"];
pub const CLAUDE_MCP_CONFIG_PATH: &str = "/tmp/gh-aw/mcp-config/mcp-servers.json";
pub const CLAUDE_DETECTION_MODEL: &str = "claude-haiku-4-5";
/// Hosts the CLI reaches besides the workflow's own allow-list.
pub const CLAUDE_DOMAINS: &[&str] = &["api.anthropic.com", "sentry.io", "statsig.anthropic.com"];
const READ_ONLY_TOOLS: &[&str] = &[
    "Glob",
    "Grep",
    "LS",
    "NotebookRead",
    "Read",
    "Task",
    "TodoWrite",
];
const EDIT_TOOLS: &[&str] = &["Edit", "MultiEdit", "NotebookEdit", "Write"];

/// Anthropic's Claude Code CLI, driven in print mode with stream-json output.
#[derive(Debug, Clone, Engine)]
pub struct ClaudeEngine {
    spec: EngineSpec,
}

impl Default for ClaudeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeEngine {
    pub fn new() -> Self {
        Self {
            spec: EngineSpec::new("claude", "Claude Code")
                .with_description("Uses Claude Code with full MCP tool support and allow-listing")
                .with_capabilities(EngineCapabilities {
                    tools_allowlist: true,
                    http_transport: true,
                    max_turns: true,
                    web_fetch: true,
                    web_search: true,
                    firewall: true,
                    plugins: true,
                    llm_gateway_port: 10000,
                }),
        }
    }

    fn profile(&self) -> EngineProfile<'_> {
        EngineProfile {
            spec: &self.spec,
            credentials: CLAUDE_CREDENTIALS,
            default_domains: CLAUDE_DOMAINS,
            detection_model: Some(CLAUDE_DETECTION_MODEL),
            mcp_config_path: Some(CLAUDE_MCP_CONFIG_PATH),
        }
    }

    /// Value of `--allowed-tools`: built-in tools, shell commands and
    /// `mcp__<server>[__<tool>]` entries, sorted.
    pub fn allowed_tools(
        &self,
        workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> Vec<String> {
        let tools = &workflow.tools;
        let mut allowed: BTreeSet<String> =
            READ_ONLY_TOOLS.iter().map(|tool| (*tool).to_string()).collect();
        if tools.edit {
            allowed.extend(EDIT_TOOLS.iter().map(|tool| (*tool).to_string()));
        }
        if tools.bash_allows_everything() {
            allowed.insert("Bash".to_string());
        } else {
            for command in tools.bash_commands() {
                allowed.insert(format!("Bash({command})"));
            }
        }
        if tools.web_fetch {
            allowed.insert("WebFetch".to_string());
        }
        if tools.web_search {
            allowed.insert("WebSearch".to_string());
        }
        for server in servers.servers() {
            if server.allowed.is_empty() || server.allowed.iter().any(|tool| tool == "*") {
                allowed.insert(format!("mcp__{}", server.name));
            } else {
                for tool in &server.allowed {
                    allowed.insert(format!("mcp__{}__{tool}", server.name));
                }
            }
        }
        allowed.into_iter().collect()
    }

    fn native_command(&self, plan: &ExecutionPlan<'_>) -> NativeCommand {
        let workflow = plan.workflow;
        let binary = workflow
            .engine
            .command
            .clone()
            .unwrap_or_else(|| CLAUDE_CLI.binary.to_string());
        let mut parts = vec![binary, "--print".to_string()];
        parts.push(plan.model_argument(|model| format!("--model {model}")));
        if let Some(max_turns) = plan.max_turns() {
            parts.push(format!("--max-turns {max_turns}"));
        }
        if plan.has_mcp_servers() {
            parts.push(format!("--mcp-config {CLAUDE_MCP_CONFIG_PATH}"));
        }
        let tools = self.allowed_tools(workflow, &plan.mcp).join(",");
        parts.push(format!("--allowed-tools {}", shell_escape_arg(&tools)));
        parts.push("--debug --verbose".to_string());
        parts.push("--permission-mode bypassPermissions".to_string());
        parts.push("--output-format stream-json".to_string());
        parts.extend(workflow.engine.args.iter().map(|arg| shell_escape_arg(arg)));
        parts.push(plan.prompt_argument());
        NativeCommand::new(parts.join(" "))
    }

    fn engine_env(&self, workflow: &WorkflowSpec) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        for key in ["DISABLE_TELEMETRY", "DISABLE_ERROR_REPORTING", "DISABLE_BUG_COMMAND"] {
            env.insert(key.to_string(), "1".to_string());
        }
        if let Some(startup) = workflow.tools.startup_timeout {
            env.insert("MCP_TIMEOUT".to_string(), startup.saturating_mul(1000).to_string());
        }
        if let Some(timeout) = workflow.tools.timeout {
            let millis = timeout.saturating_mul(1000).to_string();
            env.insert("MCP_TOOL_TIMEOUT".to_string(), millis.clone());
            env.insert("BASH_DEFAULT_TIMEOUT_MS".to_string(), millis.clone());
            env.insert("BASH_MAX_TIMEOUT_MS".to_string(), millis);
        }
        env
    }
}

impl WorkflowExecutor for ClaudeEngine {
    fn installation_steps(&self, workflow: &WorkflowSpec) -> Vec<PipelineStep> {
        common::installation_steps(&self.spec, workflow, CLAUDE_CREDENTIALS, &CLAUDE_CLI)
    }

    fn execution_steps(
        &self,
        workflow: &WorkflowSpec,
        log_file: &str,
    ) -> EngineResult<Vec<PipelineStep>> {
        let plan = ExecutionPlan::new(self.profile(), workflow, log_file);
        let native = self.native_command(&plan);
        Ok(vec![plan.execution_step(&native, self.engine_env(workflow))?])
    }
}

impl McpConfigProvider for ClaudeEngine {
    fn mcp_config_path(&self) -> &str {
        CLAUDE_MCP_CONFIG_PATH
    }

    fn render_mcp_config(
        &self,
        _workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> EngineResult<PipelineStep> {
        let document = McpConfigFormat::Claude.render(servers)?;
        Ok(mcp::mcp_setup_step(CLAUDE_MCP_CONFIG_PATH, &document))
    }
}

impl LogParser for ClaudeEngine {
    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        logs::parse_stream_json_log(log)
    }

    fn log_parser_script_id(&self) -> &str {
        "parse_claude_log"
    }

    fn log_file_for_parsing(&self) -> &str {
        common::AGENT_STDIO_LOG
    }
}

impl SecurityProvider for ClaudeEngine {
    fn default_detection_model(&self) -> Option<&str> {
        Some(CLAUDE_DETECTION_MODEL)
    }

    fn required_secret_names(&self, workflow: &WorkflowSpec) -> Vec<String> {
        secrets::required_secret_names(workflow, &self.spec.capabilities, CLAUDE_CREDENTIALS)
    }

    fn allowed_domains(&self, workflow: &WorkflowSpec) -> Vec<String> {
        domains::compute_allowed_domains(workflow, CLAUDE_DOMAINS)
    }
}

impl AgenticEngine for ClaudeEngine {
    fn as_mcp_config_provider(&self) -> Option<&dyn McpConfigProvider> {
        Some(self)
    }

    fn as_log_parser(&self) -> Option<&dyn LogParser> {
        Some(self)
    }

    fn as_security_provider(&self) -> Option<&dyn SecurityProvider> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::resolve_mcp_servers;
    use crate::traits::CapabilityProvider;
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> WorkflowSpec {
        serde_yaml::from_str(yaml).expect("workflow parses")
    }

    #[test]
    fn identity_and_capabilities() {
        let engine = ClaudeEngine::new();
        assert_eq!(engine.id(), "claude");
        assert_eq!(engine.display_name(), "Claude Code");
        assert!(engine.supports_max_turns());
        assert_eq!(engine.llm_gateway_port(), 10000);
    }

    #[test]
    fn allowed_tools_cover_bash_edit_and_mcp() {
        let engine = ClaudeEngine::new();
        let workflow = parse(
            "tools:\n  edit:\n  bash: [\"git status\", ls]\n  github:\n    allowed: [get_issue]\nsafe-outputs:\n  create-issue:\n",
        );
        let servers = resolve_mcp_servers(&workflow, &engine.spec.capabilities);
        let tools = engine.allowed_tools(&workflow, &servers);
        for expected in [
            "Bash(git status)",
            "Bash(ls)",
            "Edit",
            "Write",
            "mcp__github__get_issue",
            "mcp__safeoutputs",
            "Read",
        ] {
            assert!(tools.contains(&expected.to_string()), "missing {expected}: {tools:?}");
        }
        let mut sorted = tools.clone();
        sorted.sort();
        assert_eq!(tools, sorted);
    }

    #[test]
    fn execution_step_shape() {
        let engine = ClaudeEngine::new();
        let workflow = parse(
            "engine:\n  id: claude\n  max-turns: 7\n  model: claude-sonnet-4\ntools:\n  timeout: 30\nsafe-outputs:\n  create-issue:\n",
        );
        let steps = engine
            .execution_steps(&workflow, common::AGENT_STDIO_LOG)
            .expect("steps");
        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert_eq!(step.id(), Some(common::EXECUTION_STEP_ID));
        let script = step.script();
        assert!(script.starts_with("set -o pipefail\n"));
        assert!(script.contains("claude --print --model claude-sonnet-4 --max-turns 7"));
        assert!(script.contains("--mcp-config /tmp/gh-aw/mcp-config/mcp-servers.json"));
        assert!(script.contains("--output-format stream-json"));
        let env = step.env();
        assert_eq!(env.get("GH_AW_MAX_TURNS").map(String::as_str), Some("7"));
        assert_eq!(env.get("MCP_TOOL_TIMEOUT").map(String::as_str), Some("30000"));
        assert_eq!(
            env.get("ANTHROPIC_API_KEY").map(String::as_str),
            Some("${{ secrets.ANTHROPIC_API_KEY }}")
        );
        assert!(!env.contains_key("OPENAI_API_KEY"));
    }

    #[test]
    fn installation_validates_either_credential() {
        let engine = ClaudeEngine::new();
        let steps = engine.installation_steps(&WorkflowSpec::default());
        assert_eq!(
            steps[0].name(),
            Some("Validate ANTHROPIC_API_KEY or CLAUDE_CODE_OAUTH_TOKEN secret")
        );
        assert!(steps
            .last()
            .is_some_and(|step| step.script().contains("@anthropic-ai/claude-code@2.0.62")));
    }

    #[test]
    fn optional_roles_are_exposed() {
        let engine = ClaudeEngine::new();
        assert!(engine.as_mcp_config_provider().is_some());
        assert_eq!(
            engine.as_log_parser().map(|parser| parser.log_parser_script_id()),
            Some("parse_claude_log")
        );
        assert_eq!(
            engine
                .as_security_provider()
                .and_then(|provider| provider.default_detection_model()),
            Some(CLAUDE_DETECTION_MODEL)
        );
    }
}
