//! Capability roles an engine implements.
//!
//! Every engine is an [`AgenticEngine`] (identity plus execution). The protocol
//! config, log parsing and security roles are optional; callers discover them
//! through the `as_*` accessors instead of assuming them.

use crate::error::EngineResult;
use crate::logs::LogMetrics;
use crate::mcp::ResolvedMcpServers;
use crate::spec::EngineCapabilities;
use crate::spec::EngineSpec;
use crate::step::PipelineStep;
use crate::workflow::WorkflowSpec;

/// Identity. Usually implemented with `#[derive(Engine)]`.
pub trait Engine {
    fn spec(&self) -> &EngineSpec;

    fn id(&self) -> &str {
        self.spec().id()
    }

    fn display_name(&self) -> &str {
        self.spec().display_name()
    }

    fn description(&self) -> &str {
        self.spec().description()
    }

    fn is_experimental(&self) -> bool {
        self.spec().experimental
    }
}

/// Capability queries, available on every [`Engine`].
pub trait CapabilityProvider: Engine {
    fn capabilities(&self) -> &EngineCapabilities {
        &self.spec().capabilities
    }

    fn supports_tools_allowlist(&self) -> bool {
        self.capabilities().tools_allowlist
    }

    fn supports_http_transport(&self) -> bool {
        self.capabilities().http_transport
    }

    fn supports_max_turns(&self) -> bool {
        self.capabilities().max_turns
    }

    fn supports_web_fetch(&self) -> bool {
        self.capabilities().web_fetch
    }

    fn supports_web_search(&self) -> bool {
        self.capabilities().web_search
    }

    fn supports_firewall(&self) -> bool {
        self.capabilities().firewall
    }

    fn supports_plugins(&self) -> bool {
        self.capabilities().plugins
    }

    /// `-1` when the engine has no LLM gateway.
    fn llm_gateway_port(&self) -> i32 {
        self.capabilities().llm_gateway_port
    }
}

impl<T> CapabilityProvider for T where T: Engine + ?Sized {}

pub trait WorkflowExecutor: Engine {
    /// Paths the runner should upload as artifacts after the agent finishes.
    fn declared_output_files(&self) -> Vec<String> {
        Vec::new()
    }

    fn installation_steps(&self, workflow: &WorkflowSpec) -> Vec<PipelineStep>;

    fn execution_steps(
        &self,
        workflow: &WorkflowSpec,
        log_file: &str,
    ) -> EngineResult<Vec<PipelineStep>>;
}

/// Renders the engine's MCP configuration document.
pub trait McpConfigProvider {
    /// Where the execution step expects the rendered document.
    fn mcp_config_path(&self) -> &str;

    fn render_mcp_config(
        &self,
        workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> EngineResult<PipelineStep>;
}

pub trait LogParser {
    fn parse_log_metrics(&self, log: &str) -> LogMetrics;

    /// Identifier of the script the pipeline runs to summarize the log.
    fn log_parser_script_id(&self) -> &str;

    fn log_file_for_parsing(&self) -> &str;
}

pub trait SecurityProvider {
    /// Cheaper model used by detection jobs when none is configured.
    fn default_detection_model(&self) -> Option<&str> {
        None
    }

    /// Exact secret names this engine needs for `workflow`.
    fn required_secret_names(&self, workflow: &WorkflowSpec) -> Vec<String>;

    /// Hosts the sandboxed agent may reach for `workflow`.
    fn allowed_domains(&self, workflow: &WorkflowSpec) -> Vec<String>;
}

pub trait AgenticEngine: WorkflowExecutor + Send + Sync {
    fn as_mcp_config_provider(&self) -> Option<&dyn McpConfigProvider> {
        None
    }

    fn as_log_parser(&self) -> Option<&dyn LogParser> {
        None
    }

    fn as_security_provider(&self) -> Option<&dyn SecurityProvider> {
        None
    }
}

/// Every role at once, for call sites that need full engine behavior.
pub trait CodingAgentEngine:
    AgenticEngine + McpConfigProvider + LogParser + SecurityProvider
{
}

impl<T> CodingAgentEngine for T where
    T: AgenticEngine + McpConfigProvider + LogParser + SecurityProvider + ?Sized
{
}
