//! Security sandbox policy: whether the agent runs behind the network
//! firewall, inside the process-isolation runtime, or directly.
//!
//! [`decide_firewall_auto_enable`] is a pure decision; only the compiler that
//! owns the [`WorkflowSpec`] calls [`apply_firewall_decision`]. Engines read the
//! outcome through [`resolve_sandbox_mode`].

pub mod domains;
pub mod firewall;
pub mod isolation;

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::spec::EngineCapabilities;
use crate::workflow::FirewallConfig;
use crate::workflow::SandboxKind;
use crate::workflow::WorkflowSpec;

/// How the execution step runs the native agent command. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    Direct,
    Firewall,
    ProcessIsolation,
}

impl SandboxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Firewall => "firewall",
            Self::ProcessIsolation => "process-isolation",
        }
    }

    pub fn is_sandboxed(self) -> bool {
        !matches!(self, Self::Direct)
    }
}

impl std::fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the firewall auto-enable check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallDecision {
    Enable,
    Unchanged(FirewallSkip),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallSkip {
    EngineUnsupported,
    AlreadyConfigured,
    SandboxDisabled,
    IsolationSandbox,
    WildcardAllowed,
    NoNetworkPermissions,
}

/// Decide whether a firewall config should be synthesized for `workflow`.
pub fn decide_firewall_auto_enable(
    workflow: &WorkflowSpec,
    capabilities: &EngineCapabilities,
) -> FirewallDecision {
    if !capabilities.firewall {
        return FirewallDecision::Unchanged(FirewallSkip::EngineUnsupported);
    }
    if workflow.firewall().is_some() {
        return FirewallDecision::Unchanged(FirewallSkip::AlreadyConfigured);
    }
    if workflow.sandbox_disabled() {
        return FirewallDecision::Unchanged(FirewallSkip::SandboxDisabled);
    }
    let requested_kind = workflow.agent_sandbox().and_then(|agent| agent.kind);
    if requested_kind == Some(SandboxKind::ProcessIsolation) {
        return FirewallDecision::Unchanged(FirewallSkip::IsolationSandbox);
    }
    if workflow.allows_all_domains() {
        return FirewallDecision::Unchanged(FirewallSkip::WildcardAllowed);
    }
    if requested_kind == Some(SandboxKind::Firewall) || workflow.network.is_some() {
        return FirewallDecision::Enable;
    }
    FirewallDecision::Unchanged(FirewallSkip::NoNetworkPermissions)
}

/// Write an `Enable` decision back into the workflow's network permissions.
/// Returns whether anything changed.
pub fn apply_firewall_decision(workflow: &mut WorkflowSpec, decision: FirewallDecision) -> bool {
    match decision {
        FirewallDecision::Enable => {
            let network = workflow.network.get_or_insert_with(Default::default);
            network.firewall = Some(FirewallConfig::enabled());
            info!(
                allowed = network.allowed.len(),
                "firewall auto-enabled for restricted network permissions"
            );
            true
        }
        FirewallDecision::Unchanged(reason) => {
            debug!(?reason, "firewall auto-enable skipped");
            false
        }
    }
}

/// Whether the workflow's firewall config is on and expressible.
pub fn is_firewall_enabled(workflow: &WorkflowSpec) -> bool {
    workflow.firewall().is_some_and(|firewall| firewall.enabled) && !workflow.allows_all_domains()
}

/// Pick the single sandbox mode for an engine. The isolation sandbox takes
/// precedence when both it and the firewall are configured.
pub fn resolve_sandbox_mode(
    workflow: &WorkflowSpec,
    capabilities: &EngineCapabilities,
) -> SandboxMode {
    if workflow.sandbox_disabled() {
        return SandboxMode::Direct;
    }

    let firewall_on = workflow.firewall().is_some_and(|firewall| firewall.enabled);
    let isolation = workflow
        .agent_sandbox()
        .and_then(|agent| agent.kind)
        .is_some_and(|kind| kind == SandboxKind::ProcessIsolation);

    if isolation {
        if firewall_on {
            warn!(
                "both firewall and process-isolation sandbox configured; using process isolation"
            );
        }
        return SandboxMode::ProcessIsolation;
    }

    if firewall_on && workflow.allows_all_domains() {
        warn!("firewall cannot allow every domain; running without the firewall");
        return SandboxMode::Direct;
    }
    if firewall_on && capabilities.firewall {
        return SandboxMode::Firewall;
    }
    if firewall_on {
        warn!("engine does not support the firewall; running without it");
    }
    SandboxMode::Direct
}
