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

pub const COPILOT_CLI: CliPackage = CliPackage {
    package: "@github/copilot",
    version: "0.0.367",
    binary: "copilot",
};
pub const COPILOT_CREDENTIALS: &[&str] = &["COPILOT_GITHUB_TOKEN"];
pub const COPILOT_MCP_CONFIG_PATH: &str = "/home/runner/.copilot/mcp-config.json";
pub const COPILOT_DETECTION_MODEL: &str = "gpt-5-mini";
pub const COPILOT_DOMAINS: &[&str] = &[
    "api.business.githubcopilot.com",
    "api.enterprise.githubcopilot.com",
    "api.github.com",
    "api.githubcopilot.com",
    "api.individual.githubcopilot.com",
    "github.com",
];

#[derive(Debug, Clone, Engine)]
pub struct CopilotEngine {
    spec: EngineSpec,
}

impl Default for CopilotEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CopilotEngine {
    pub fn new() -> Self {
        Self {
            spec: EngineSpec::new("copilot", "GitHub Copilot CLI")
                .with_description("Uses GitHub Copilot CLI with MCP server support")
                .with_capabilities(EngineCapabilities {
                    tools_allowlist: true,
                    http_transport: true,
                    max_turns: false,
                    web_fetch: true,
                    web_search: false,
                    firewall: true,
                    plugins: true,
                    llm_gateway_port: 10002,
                }),
        }
    }

    fn profile(&self) -> EngineProfile<'_> {
        EngineProfile {
            spec: &self.spec,
            credentials: COPILOT_CREDENTIALS,
            default_domains: COPILOT_DOMAINS,
            detection_model: Some(COPILOT_DETECTION_MODEL),
            mcp_config_path: Some(COPILOT_MCP_CONFIG_PATH),
        }
    }

    /// `--allow-tool` arguments, or `--allow-all-tools` when bash is unrestricted.
    pub fn tool_arguments(
        &self,
        workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> Vec<String> {
        let tools = &workflow.tools;
        if tools.bash_allows_everything() {
            return vec!["--allow-all-tools".to_string()];
        }

        let mut allowed = BTreeSet::new();
        for command in tools.bash_commands() {
            allowed.insert(format!("shell({command})"));
        }
        if tools.edit {
            allowed.insert("write".to_string());
        }
        if tools.web_fetch {
            allowed.insert("web_fetch".to_string());
        }
        for server in servers.servers() {
            if server.allowed.is_empty() || server.allowed.iter().any(|tool| tool == "*") {
                allowed.insert(server.name.clone());
            } else {
                for tool in &server.allowed {
                    allowed.insert(format!("{}({tool})", server.name));
                }
            }
        }
        allowed
            .into_iter()
            .map(|tool| format!("--allow-tool {}", shell_escape_arg(&tool)))
            .collect()
    }

    fn native_command(&self, plan: &ExecutionPlan<'_>) -> NativeCommand {
        let workflow = plan.workflow;
        let binary = workflow
            .engine
            .command
            .clone()
            .unwrap_or_else(|| COPILOT_CLI.binary.to_string());
        let mut parts = vec![
            binary,
            "--add-dir /tmp/gh-aw/".to_string(),
            "--log-level all".to_string(),
            format!("--log-dir {}", common::AGENT_LOGS_DIR),
        ];
        if plan.is_firewalled() {
            parts.push("--add-dir \"${GITHUB_WORKSPACE}\"".to_string());
        }
        parts.push("--disable-builtin-mcps".to_string());
        parts.push(plan.model_argument(|model| format!("--model {model}")));
        if let Some(agent) = workflow.engine.agent.as_deref() {
            parts.push(format!("--agent {}", shell_escape_arg(common::agent_stem(agent))));
        }
        parts.extend(self.tool_arguments(workflow, &plan.mcp));
        parts.extend(workflow.engine.args.iter().map(|arg| shell_escape_arg(arg)));
        parts.push(format!("--prompt \"$(cat {})\"", common::PROMPT_PATH));
        NativeCommand::new(parts.join(" "))
            .with_preamble(format!("mkdir -p {}", common::AGENT_LOGS_DIR))
    }

    fn engine_env(&self) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        env.insert("XDG_CONFIG_HOME".to_string(), "/home/runner".to_string());
        env.insert(
            "GITHUB_HEAD_REF".to_string(),
            "${{ github.head_ref }}".to_string(),
        );
        env.insert(
            "GITHUB_REF_NAME".to_string(),
            "${{ github.ref_name }}".to_string(),
        );
        env.insert(
            "GITHUB_STEP_SUMMARY".to_string(),
            "${{ env.GITHUB_STEP_SUMMARY }}".to_string(),
        );
        env
    }
}

impl WorkflowExecutor for CopilotEngine {
    fn declared_output_files(&self) -> Vec<String> {
        vec![common::AGENT_LOGS_DIR.to_string()]
    }

    fn installation_steps(&self, workflow: &WorkflowSpec) -> Vec<PipelineStep> {
        common::installation_steps(&self.spec, workflow, COPILOT_CREDENTIALS, &COPILOT_CLI)
    }

    fn execution_steps(
        &self,
        workflow: &WorkflowSpec,
        log_file: &str,
    ) -> EngineResult<Vec<PipelineStep>> {
        let plan = ExecutionPlan::new(self.profile(), workflow, log_file);
        let native = self.native_command(&plan);
        Ok(vec![plan.execution_step(&native, self.engine_env())?])
    }
}

impl McpConfigProvider for CopilotEngine {
    fn mcp_config_path(&self) -> &str {
        COPILOT_MCP_CONFIG_PATH
    }

    fn render_mcp_config(
        &self,
        _workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> EngineResult<PipelineStep> {
        let document = McpConfigFormat::Copilot.render(servers)?;
        Ok(mcp::mcp_setup_step(COPILOT_MCP_CONFIG_PATH, &document))
    }
}

impl LogParser for CopilotEngine {
    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        logs::parse_plain_log(log)
    }

    fn log_parser_script_id(&self) -> &str {
        "parse_copilot_log"
    }

    fn log_file_for_parsing(&self) -> &str {
        common::AGENT_LOGS_DIR
    }
}

impl SecurityProvider for CopilotEngine {
    fn default_detection_model(&self) -> Option<&str> {
        Some(COPILOT_DETECTION_MODEL)
    }

    fn required_secret_names(&self, workflow: &WorkflowSpec) -> Vec<String> {
        secrets::required_secret_names(workflow, &self.spec.capabilities, COPILOT_CREDENTIALS)
    }

    fn allowed_domains(&self, workflow: &WorkflowSpec) -> Vec<String> {
        domains::compute_allowed_domains(workflow, COPILOT_DOMAINS)
    }
}

impl AgenticEngine for CopilotEngine {
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
