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
use crate::spec::NO_LLM_GATEWAY;
use crate::step::PipelineStep;
use crate::traits::AgenticEngine;
use crate::traits::LogParser;
use crate::traits::McpConfigProvider;
use crate::traits::SecurityProvider;
use crate::traits::WorkflowExecutor;
use crate::workflow::WorkflowSpec;

pub const GEMINI_CLI: CliPackage = CliPackage {
    package: "@google/gemini-cli",
    version: "0.19.1",
    binary: "gemini",
};
pub const GEMINI_CREDENTIALS: &[&str] = &["GEMINI_API_KEY"];
pub const GEMINI_SETTINGS_PATH: &str = "/tmp/gh-aw/mcp-config/settings.json";
pub const GEMINI_DETECTION_MODEL: &str = "gemini-2.5-flash";
pub const GEMINI_DOMAINS: &[&str] = &["generativelanguage.googleapis.com", "oauth2.googleapis.com"];

/// Google's Gemini CLI in non-interactive `--yolo` mode. Experimental.
#[derive(Debug, Clone, Engine)]
pub struct GeminiEngine {
    spec: EngineSpec,
}

impl Default for GeminiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiEngine {
    pub fn new() -> Self {
        Self {
            spec: EngineSpec::new("gemini", "Google Gemini CLI")
                .with_description("Uses Google Gemini CLI with MCP server support")
                .with_experimental(true)
                .with_capabilities(EngineCapabilities {
                    tools_allowlist: false,
                    http_transport: true,
                    max_turns: false,
                    web_fetch: true,
                    web_search: true,
                    firewall: true,
                    plugins: false,
                    llm_gateway_port: NO_LLM_GATEWAY,
                }),
        }
    }

    fn profile(&self) -> EngineProfile<'_> {
        EngineProfile {
            spec: &self.spec,
            credentials: GEMINI_CREDENTIALS,
            default_domains: GEMINI_DOMAINS,
            detection_model: Some(GEMINI_DETECTION_MODEL),
            mcp_config_path: Some(GEMINI_SETTINGS_PATH),
        }
    }

    fn native_command(&self, plan: &ExecutionPlan<'_>) -> NativeCommand {
        let workflow = plan.workflow;
        let binary = workflow
            .engine
            .command
            .clone()
            .unwrap_or_else(|| GEMINI_CLI.binary.to_string());
        let mut parts = vec![binary];
        parts.push(plan.model_argument(|model| format!("--model {model}")));
        parts.push("--yolo".to_string());
        parts.push("--output-format stream-json".to_string());
        parts.extend(workflow.engine.args.iter().map(|arg| shell_escape_arg(arg)));
        parts.push(format!("--prompt {}", plan.prompt_argument()));
        NativeCommand::new(parts.join(" "))
    }

    fn engine_env(&self, plan: &ExecutionPlan<'_>) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        if plan.has_mcp_servers() {
            env.insert(
                "GEMINI_CLI_SYSTEM_SETTINGS_PATH".to_string(),
                GEMINI_SETTINGS_PATH.to_string(),
            );
        }
        env
    }
}

impl WorkflowExecutor for GeminiEngine {
    fn installation_steps(&self, workflow: &WorkflowSpec) -> Vec<PipelineStep> {
        common::installation_steps(&self.spec, workflow, GEMINI_CREDENTIALS, &GEMINI_CLI)
    }

    fn execution_steps(
        &self,
        workflow: &WorkflowSpec,
        log_file: &str,
    ) -> EngineResult<Vec<PipelineStep>> {
        let plan = ExecutionPlan::new(self.profile(), workflow, log_file);
        let native = self.native_command(&plan);
        let env = self.engine_env(&plan);
        Ok(vec![plan.execution_step(&native, env)?])
    }
}

impl McpConfigProvider for GeminiEngine {
    fn mcp_config_path(&self) -> &str {
        GEMINI_SETTINGS_PATH
    }

    fn render_mcp_config(
        &self,
        _workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> EngineResult<PipelineStep> {
        let document = McpConfigFormat::Gemini.render(servers)?;
        Ok(mcp::mcp_setup_step(GEMINI_SETTINGS_PATH, &document))
    }
}

impl LogParser for GeminiEngine {
    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        logs::parse_stream_json_log(log)
    }

    fn log_parser_script_id(&self) -> &str {
        "parse_gemini_log"
    }

    fn log_file_for_parsing(&self) -> &str {
        common::AGENT_STDIO_LOG
    }
}

impl SecurityProvider for GeminiEngine {
    fn default_detection_model(&self) -> Option<&str> {
        Some(GEMINI_DETECTION_MODEL)
    }

    fn required_secret_names(&self, workflow: &WorkflowSpec) -> Vec<String> {
        secrets::required_secret_names(workflow, &self.spec.capabilities, GEMINI_CREDENTIALS)
    }

    fn allowed_domains(&self, workflow: &WorkflowSpec) -> Vec<String> {
        domains::compute_allowed_domains(workflow, GEMINI_DOMAINS)
    }
}

impl AgenticEngine for GeminiEngine {
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
