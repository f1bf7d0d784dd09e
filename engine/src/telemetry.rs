use tracing::info;

use crate::compiler::CompiledEngineSteps;
use crate::sandbox::SandboxMode;

/// Emit one structured event for a compiled engine.
pub fn record_engine_compilation(
    compiled: &CompiledEngineSteps,
    sandbox_mode: SandboxMode,
    secrets: usize,
    mcp_servers: usize,
) {
    info!(
        target: "aw::telemetry",
        event = "engine_compiled",
        engine = %compiled.engine_id,
        sandbox_mode = sandbox_mode.as_str(),
        install_steps = compiled.installation.len(),
        mcp_setup = compiled.mcp_setup.is_some(),
        execution_steps = compiled.execution.len(),
        secrets,
        mcp_servers,
    );
}
