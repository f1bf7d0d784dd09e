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

pub const CODEX_CLI: CliPackage = CliPackage {
    package: "@openai/codex",
    version: "0.65.0",
    binary: "codex",
};
pub const CODEX_CREDENTIALS: &[&str] = &["CODEX_API_KEY", "OPENAI_API_KEY"];
pub const CODEX_HOME: &str = "/tmp/gh-aw/mcp-config";
pub const CODEX_CONFIG_PATH: &str = "/tmp/gh-aw/mcp-config/config.toml";
pub const CODEX_DETECTION_MODEL: &str = "gpt-5.1-codex-mini";
pub const CODEX_DOMAINS: &[&str] = &["api.openai.com", "openai.com"];
const CODEX_RUST_LOG: &str =
    "trace,hyper_util=info,mio=info,reqwest=info,os_info=info,codex_otel=warn,codex_core=debug,codex_exec=debug";

#[derive(Debug, Clone, Engine)]
pub struct CodexEngine {
    spec: EngineSpec,
}

impl Default for CodexEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CodexEngine {
    pub fn new() -> Self {
        Self {
            spec: EngineSpec::new("codex", "Codex")
                .with_description("Uses OpenAI Codex CLI with MCP server support")
                .with_capabilities(EngineCapabilities {
                    tools_allowlist: true,
                    http_transport: true,
                    max_turns: false,
                    web_fetch: false,
                    web_search: true,
                    firewall: true,
                    plugins: false,
                    llm_gateway_port: 10001,
                }),
        }
    }

    fn profile(&self) -> EngineProfile<'_> {
        EngineProfile {
            spec: &self.spec,
            credentials: CODEX_CREDENTIALS,
            default_domains: CODEX_DOMAINS,
            detection_model: Some(CODEX_DETECTION_MODEL),
            mcp_config_path: Some(CODEX_CONFIG_PATH),
        }
    }

    fn native_command(&self, plan: &ExecutionPlan<'_>) -> NativeCommand {
        let workflow = plan.workflow;
        let binary = workflow
            .engine
            .command
            .clone()
            .unwrap_or_else(|| CODEX_CLI.binary.to_string());
        let mut parts = vec![binary];
        parts.push(plan.model_argument(|model| format!("-c model={model}")));
        parts.push("exec".to_string());
        // The firewall container is the sandbox; codex's own would block the proxy.
        if plan.is_firewalled() {
            parts.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        } else {
            parts.push("--full-auto".to_string());
        }
        parts.push("--skip-git-repo-check".to_string());
        if workflow.tools.web_search {
            parts.push("-c tools.web_search=true".to_string());
        }
        parts.extend(workflow.engine.args.iter().map(|arg| shell_escape_arg(arg)));
        parts.push(plan.prompt_argument());
        NativeCommand::new(parts.join(" ")).with_preamble("mkdir -p \"$CODEX_HOME/logs\"")
    }

    fn engine_env(&self) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        env.insert("CODEX_HOME".to_string(), CODEX_HOME.to_string());
        env.insert("RUST_LOG".to_string(), CODEX_RUST_LOG.to_string());
        env
    }
}

impl WorkflowExecutor for CodexEngine {
    fn installation_steps(&self, workflow: &WorkflowSpec) -> Vec<PipelineStep> {
        common::installation_steps(&self.spec, workflow, CODEX_CREDENTIALS, &CODEX_CLI)
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

impl McpConfigProvider for CodexEngine {
    fn mcp_config_path(&self) -> &str {
        CODEX_CONFIG_PATH
    }

    fn render_mcp_config(
        &self,
        _workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> EngineResult<PipelineStep> {
        let document = McpConfigFormat::Codex.render(servers)?;
        Ok(mcp::mcp_setup_step(CODEX_CONFIG_PATH, &document))
    }
}

impl LogParser for CodexEngine {
    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        logs::parse_codex_log(log)
    }

    fn log_parser_script_id(&self) -> &str {
        "parse_codex_log"
    }

    fn log_file_for_parsing(&self) -> &str {
        common::AGENT_STDIO_LOG
    }
}

impl SecurityProvider for CodexEngine {
    fn default_detection_model(&self) -> Option<&str> {
        Some(CODEX_DETECTION_MODEL)
    }

    fn required_secret_names(&self, workflow: &WorkflowSpec) -> Vec<String> {
        secrets::required_secret_names(workflow, &self.spec.capabilities, CODEX_CREDENTIALS)
    }

    fn allowed_domains(&self, workflow: &WorkflowSpec) -> Vec<String> {
        domains::compute_allowed_domains(workflow, CODEX_DOMAINS)
    }
}

impl AgenticEngine for CodexEngine {
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
