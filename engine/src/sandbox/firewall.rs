//! Invocation of the network firewall runner (`awf`) around an agent command.

use tracing::warn;

use crate::shell::continuation_lines;
use crate::shell::shell_escape_arg;
use crate::shell::shell_quote;
use crate::spec::EngineCapabilities;
use crate::step::PipelineStep;
use crate::workflow::WorkflowSpec;

pub const DEFAULT_FIREWALL_VERSION: &str = "v0.7.0";
pub const FIREWALL_COMMAND: &str = "sudo -E awf";
pub const FIREWALL_LOGS_DIR: &str = "/tmp/gh-aw/sandbox/firewall/logs";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const INSTALLER_URL: &str =
    "https://raw.githubusercontent.com/githubnext/gh-aw-firewall/main/install.sh";

/// Container image tag for a firewall version: leading `v` stripped.
pub fn image_tag(version: Option<&str>) -> String {
    let version = version
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .unwrap_or(DEFAULT_FIREWALL_VERSION);
    version.strip_prefix('v').unwrap_or(version).to_string()
}

/// Version the workflow pins, or the default.
pub fn firewall_version(workflow: &WorkflowSpec) -> &str {
    workflow
        .firewall()
        .and_then(|firewall| firewall.version.as_deref())
        .filter(|version| !version.trim().is_empty())
        .unwrap_or(DEFAULT_FIREWALL_VERSION)
}

/// Install step for the runner binary, pinned to the workflow's version.
pub fn firewall_install_step(workflow: &WorkflowSpec) -> PipelineStep {
    let version = firewall_version(workflow);
    PipelineStep::builder("Install awf binary")
        .run_lines([
            format!("echo \"Installing awf via installer script (requested version: {version})\""),
            format!("curl -sSL {INSTALLER_URL} | sudo AWF_VERSION={version} bash"),
            "which awf".to_string(),
            "awf --version".to_string(),
        ])
        .build()
}

/// Everything the runner invocation depends on besides the workflow itself.
#[derive(Debug, Clone, Copy)]
pub struct FirewallInvocation<'a> {
    pub native_command: &'a str,
    pub allowed_domains: &'a [String],
    pub blocked_domains: &'a [String],
    pub capabilities: &'a EngineCapabilities,
    pub has_mcp_servers: bool,
}

/// Runner argument list, one flag (with its value) per element, ending with
/// `-- '<native command>'`.
pub fn firewall_arguments(
    workflow: &WorkflowSpec,
    invocation: FirewallInvocation<'_>,
) -> Vec<String> {
    let agent = workflow.agent_sandbox();
    let firewall = workflow.firewall();

    let mut parts = vec![
        agent
            .and_then(|agent| agent.command.clone())
            .unwrap_or_else(|| FIREWALL_COMMAND.to_string()),
        "--env-all".to_string(),
        "--container-workdir \"${GITHUB_WORKSPACE}\"".to_string(),
        "--mount /tmp:/tmp:rw".to_string(),
        "--mount \"${GITHUB_WORKSPACE}:${GITHUB_WORKSPACE}:rw\"".to_string(),
    ];

    if let Some(agent) = agent {
        let mut mounts = agent.mounts.clone();
        mounts.sort();
        for mount in mounts {
            parts.push(format!("--mount {}", shell_escape_arg(&mount)));
        }
    }

    parts.push(format!(
        "--allow-domains {}",
        shell_quote(&invocation.allowed_domains.join(","))
    ));
    if !invocation.blocked_domains.is_empty() {
        parts.push(format!(
            "--block-domains {}",
            shell_quote(&invocation.blocked_domains.join(","))
        ));
    }

    let log_level = firewall
        .and_then(|firewall| firewall.log_level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    parts.push(format!("--log-level {}", shell_escape_arg(log_level)));
    parts.push(format!("--proxy-logs-dir {FIREWALL_LOGS_DIR}"));
    if invocation.has_mcp_servers {
        parts.push("--enable-host-access".to_string());
    }
    parts.push(format!(
        "--image-tag {}",
        image_tag(firewall.and_then(|firewall| firewall.version.as_deref()))
    ));
    parts.push("--skip-pull".to_string());
    if invocation.capabilities.llm_gateway_port >= 0 {
        parts.push("--enable-api-proxy".to_string());
    }

    if let Some(firewall) = firewall {
        if firewall.ssl_bump {
            parts.push("--ssl-bump".to_string());
            if !firewall.allow_urls.is_empty() {
                parts.push(format!(
                    "--allow-urls {}",
                    shell_quote(&firewall.allow_urls.join(","))
                ));
            }
        } else if !firewall.allow_urls.is_empty() {
            warn!(
                urls = firewall.allow_urls.len(),
                "allow-urls requires ssl-bump; URL filtering not applied"
            );
        }
        parts.extend(firewall.args.iter().cloned());
    }
    if let Some(agent) = agent {
        parts.extend(agent.args.iter().cloned());
    }

    parts.push(format!("-- {}", shell_quote(invocation.native_command)));
    parts
}

/// Command block lines running the native command under the runner, output
/// duplicated to `log_file`.
pub fn firewall_command_lines(
    workflow: &WorkflowSpec,
    invocation: FirewallInvocation<'_>,
    log_file: &str,
) -> Vec<String> {
    let mut parts = firewall_arguments(workflow, invocation);
    if let Some(last) = parts.last_mut() {
        last.push_str(&format!(" 2>&1 | tee -a {}", shell_escape_arg(log_file)));
    }
    continuation_lines(&parts)
}
