//! Compilation entry point: the one place that owns a mutable [`WorkflowSpec`].

use serde::Serialize;
use tracing::debug;

use crate::catalog::DEFAULT_ENGINE;
use crate::catalog::EngineCatalog;
use crate::engines::common::AGENT_STDIO_LOG;
use crate::error::EngineError;
use crate::error::EngineResult;
use crate::mcp;
use crate::sandbox;
use crate::sandbox::SandboxMode;
use crate::step::PipelineStep;
use crate::telemetry;
use crate::traits::Engine;
use crate::workflow::WorkflowSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Engine to use instead of the workflow's `engine:` entry.
    pub engine: Option<String>,
    pub log_file: String,
    /// Runner version applied when the workflow enables the firewall without pinning one.
    pub firewall_version: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            engine: None,
            log_file: AGENT_STDIO_LOG.to_string(),
            firewall_version: None,
        }
    }
}

/// Steps for one engine, in pipeline order: installation, MCP setup, execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledEngineSteps {
    pub engine_id: String,
    pub sandbox_mode: SandboxMode,
    pub installation: Vec<PipelineStep>,
    pub mcp_setup: Option<PipelineStep>,
    pub execution: Vec<PipelineStep>,
}

impl CompiledEngineSteps {
    pub fn steps(&self) -> impl Iterator<Item = &PipelineStep> {
        self.installation
            .iter()
            .chain(self.mcp_setup.iter())
            .chain(self.execution.iter())
    }

    pub fn to_yaml(&self) -> String {
        self.steps().map(PipelineStep::to_yaml).collect()
    }
}

/// Identifier the workflow compiles with: override, then `engine:`, then the default.
pub fn selected_engine_id<'a>(workflow: &'a WorkflowSpec, options: &'a CompileOptions) -> &'a str {
    options
        .engine
        .as_deref()
        .or(workflow.engine.id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_ENGINE)
}

pub fn compile_engine_steps(
    catalog: &EngineCatalog,
    workflow: &mut WorkflowSpec,
    options: &CompileOptions,
) -> EngineResult<CompiledEngineSteps> {
    validate(workflow, options)?;

    let engine = catalog.get_by_prefix(selected_engine_id(workflow, options))?;
    let capabilities = engine.spec().capabilities;

    let decision = sandbox::decide_firewall_auto_enable(workflow, &capabilities);
    sandbox::apply_firewall_decision(workflow, decision);
    if let Some(version) = &options.firewall_version {
        pin_firewall_version(workflow, version);
    }

    let workflow: &WorkflowSpec = workflow;
    let installation = engine.installation_steps(workflow);

    let servers = mcp::resolve_mcp_servers(workflow, &capabilities);
    let mcp_setup = match engine.as_mcp_config_provider() {
        Some(provider) if !servers.is_empty() => {
            Some(provider.render_mcp_config(workflow, &servers)?)
        }
        _ => None,
    };

    let execution = engine.execution_steps(workflow, &options.log_file)?;
    let secrets = engine
        .as_security_provider()
        .map_or(0, |provider| provider.required_secret_names(workflow).len());

    let compiled = CompiledEngineSteps {
        engine_id: engine.id().to_string(),
        sandbox_mode: sandbox::resolve_sandbox_mode(workflow, &capabilities),
        installation,
        mcp_setup,
        execution,
    };
    telemetry::record_engine_compilation(
        &compiled,
        compiled.sandbox_mode,
        secrets,
        servers.servers().len(),
    );
    Ok(compiled)
}

fn validate(workflow: &WorkflowSpec, options: &CompileOptions) -> EngineResult<()> {
    if options.log_file.trim().is_empty() {
        return Err(EngineError::InvalidWorkflow(
            "log file path must not be empty".to_string(),
        ));
    }
    if let Some(agent) = workflow.engine.agent.as_deref() {
        if agent.starts_with('/') || agent.split('/').any(|segment| segment == "..") {
            return Err(EngineError::InvalidWorkflow(format!(
                "agent file `{agent}` must be a path inside the workspace"
            )));
        }
    }
    Ok(())
}

fn pin_firewall_version(workflow: &mut WorkflowSpec, version: &str) {
    let Some(firewall) = workflow
        .network
        .as_mut()
        .and_then(|network| network.firewall.as_mut())
    else {
        return;
    };
    if firewall.enabled && firewall.version.is_none() {
        debug!(version, "applying default firewall version");
        firewall.version = Some(version.to_string());
    }
}
