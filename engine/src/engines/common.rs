//! Shared installation and execution-step assembly used by every engine.

use indexmap::IndexMap;
use tracing::debug;
use tracing::warn;

use crate::error::EngineResult;
use crate::mcp;
use crate::mcp::ResolvedMcpServers;
use crate::sandbox;
use crate::sandbox::SandboxMode;
use crate::sandbox::domains;
use crate::sandbox::firewall;
use crate::sandbox::firewall::FirewallInvocation;
use crate::sandbox::isolation;
use crate::sandbox::isolation::IsolationPolicy;
use crate::secrets;
use crate::shell::shell_escape_arg;
use crate::spec::EngineSpec;
use crate::step::PipelineStep;
use crate::workflow::WorkflowSpec;

pub const PROMPT_PATH: &str = "/tmp/gh-aw/aw-prompts/prompt.txt";
pub const AGENT_STDIO_LOG: &str = "/tmp/gh-aw/agent-stdio.log";
pub const AGENT_LOGS_DIR: &str = "/tmp/gh-aw/sandbox/agent/logs/";
pub const EXECUTION_STEP_ID: &str = "agentic_execution";
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 20;
pub const NODE_VERSION: &str = "24";
pub const SETUP_NODE_ACTION: &str = "actions/setup-node@v6";
const WORKSPACE_EXPRESSION: &str = "${{ github.workspace }}";

/// npm package providing an engine's CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliPackage {
    pub package: &'static str,
    pub version: &'static str,
    pub binary: &'static str,
}

/// Installation phase: secret validation, Node setup, sandbox runner, CLI.
pub fn installation_steps(
    spec: &EngineSpec,
    workflow: &WorkflowSpec,
    candidate_secrets: &[&str],
    cli: &CliPackage,
) -> Vec<PipelineStep> {
    let mut steps = Vec::new();

    let validation = secrets::secret_validation_step(spec.display_name(), candidate_secrets);
    if !validation.is_noop() {
        steps.push(validation);
    }

    steps.push(
        PipelineStep::builder("Setup Node.js")
            .uses(SETUP_NODE_ACTION)
            .with_input("node-version", NODE_VERSION)
            .with_input("package-manager-cache", "false")
            .build(),
    );

    match sandbox::resolve_sandbox_mode(workflow, &spec.capabilities) {
        SandboxMode::Firewall => steps.push(firewall::firewall_install_step(workflow)),
        SandboxMode::ProcessIsolation => steps.push(isolation::isolation_install_step()),
        SandboxMode::Direct => {}
    }

    if workflow.engine.command.is_some() {
        debug!(engine = spec.id(), "custom engine command configured; skipping CLI install");
    } else {
        let version = workflow.engine.version.as_deref().unwrap_or(cli.version);
        steps.push(
            PipelineStep::builder(format!("Install {}", spec.display_name()))
                .run_lines([
                    format!(
                        "npm install -g --silent {}@{}",
                        cli.package,
                        shell_escape_arg(version)
                    ),
                    format!("{} --version", cli.binary),
                ])
                .build(),
        );
    }

    steps
}

/// The agent's command line before sandbox wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeCommand {
    /// Host-side setup lines run before the agent.
    pub preamble: Vec<String>,
    pub command: String,
}

impl NativeCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            preamble: Vec::new(),
            command: command.into(),
        }
    }

    pub fn with_preamble(mut self, line: impl Into<String>) -> Self {
        self.preamble.push(line.into());
        self
    }
}

/// Per-engine constants the shared execution assembly needs.
#[derive(Debug, Clone, Copy)]
pub struct EngineProfile<'a> {
    pub spec: &'a EngineSpec,
    pub credentials: &'a [&'a str],
    pub default_domains: &'a [&'a str],
    pub detection_model: Option<&'a str>,
    pub mcp_config_path: Option<&'a str>,
}

/// Everything derived from the workflow for one engine's execution phase.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<'a> {
    pub profile: EngineProfile<'a>,
    pub workflow: &'a WorkflowSpec,
    pub log_file: &'a str,
    pub mode: SandboxMode,
    pub mcp: ResolvedMcpServers,
}

impl<'a> ExecutionPlan<'a> {
    pub fn new(profile: EngineProfile<'a>, workflow: &'a WorkflowSpec, log_file: &'a str) -> Self {
        let capabilities = &profile.spec.capabilities;
        let mode = sandbox::resolve_sandbox_mode(workflow, capabilities);
        let mcp = mcp::resolve_mcp_servers(workflow, capabilities);
        debug!(
            engine = profile.spec.id(),
            mode = %mode,
            mcp_servers = mcp.servers().len(),
            "planning execution step"
        );
        Self {
            profile,
            workflow,
            log_file,
            mode,
            mcp,
        }
    }

    pub fn has_mcp_servers(&self) -> bool {
        !self.mcp.is_empty()
    }

    pub fn is_firewalled(&self) -> bool {
        self.mode == SandboxMode::Firewall
    }

    pub fn model(&self) -> Option<&str> {
        self.workflow.engine.model()
    }

    /// `GH_AW_MODEL_AGENT_<ID>` or, for detection jobs, `GH_AW_MODEL_DETECTION_<ID>`.
    pub fn model_variable(&self) -> String {
        let kind = if self.workflow.is_detection_job() {
            "DETECTION"
        } else {
            "AGENT"
        };
        format!("GH_AW_MODEL_{kind}_{}", self.profile.spec.env_suffix())
    }

    /// Model selection argument. With no configured model the flag is only
    /// emitted when the repository variable is set at run time.
    pub fn model_argument(&self, render: impl Fn(&str) -> String) -> String {
        match self.model() {
            Some(model) => render(&shell_escape_arg(model)),
            None => {
                let variable = self.model_variable();
                format!("${{{variable}:+ {}}}", render(&format!("\"${variable}\"")))
            }
        }
    }

    /// Configured max turns, when the engine can honor it.
    pub fn max_turns(&self) -> Option<u32> {
        let max_turns = self.workflow.engine.max_turns?;
        if self.profile.spec.capabilities.max_turns {
            Some(max_turns)
        } else {
            warn!(
                engine = self.profile.spec.id(),
                max_turns, "engine does not support max-turns; ignoring"
            );
            None
        }
    }

    /// Prompt argument: the prompt file, prefixed by the custom agent body
    /// (frontmatter stripped) when one is configured.
    pub fn prompt_argument(&self) -> String {
        match self.workflow.engine.agent.as_deref() {
            Some(agent) => format!(
                "\"$(awk 'NR==1 && /^---$/ {{fm=1; next}} fm && /^---$/ {{fm=0; next}} !fm' \"${{GITHUB_WORKSPACE}}\"/{}; printf '\\n'; cat {PROMPT_PATH})\"",
                shell_escape_arg(agent)
            ),
            None => format!("\"$(cat {PROMPT_PATH})\""),
        }
    }

    /// Variables every engine sets, in emission order.
    pub fn base_env(&self) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        for name in self.profile.credentials {
            env.insert((*name).to_string(), secrets::secret_expression(name));
        }
        env.insert("GH_AW_PROMPT".to_string(), PROMPT_PATH.to_string());
        env.insert("GITHUB_WORKSPACE".to_string(), WORKSPACE_EXPRESSION.to_string());
        if self.has_mcp_servers() {
            if let Some(path) = self.profile.mcp_config_path {
                env.insert("GH_AW_MCP_CONFIG".to_string(), path.to_string());
            }
            for (key, value) in self.mcp.step_env() {
                env.insert(key.clone(), value.clone());
            }
        }
        if self.workflow.has_safe_outputs() {
            env.insert(
                "GH_AW_SAFE_OUTPUTS".to_string(),
                mcp::SAFE_OUTPUTS_PATH.to_string(),
            );
        }
        if let Some(timeout) = self.workflow.tools.timeout {
            env.insert("GH_AW_TOOL_TIMEOUT".to_string(), timeout.to_string());
        }
        if let Some(timeout) = self.workflow.tools.startup_timeout {
            env.insert("GH_AW_STARTUP_TIMEOUT".to_string(), timeout.to_string());
        }
        if let Some(max_turns) = self.max_turns() {
            env.insert("GH_AW_MAX_TURNS".to_string(), max_turns.to_string());
        }
        if self.model().is_none() {
            let variable = self.model_variable();
            let fallback = if self.workflow.is_detection_job() {
                self.profile.detection_model.unwrap_or_default()
            } else {
                ""
            };
            env.insert(
                variable.clone(),
                format!("${{{{ vars.{variable} || '{fallback}' }}}}"),
            );
        }
        env
    }

    /// Merge fixed variables, engine-specific variables and user overrides,
    /// then strip secrets the engine does not need.
    pub fn assemble_env(&self, engine_env: IndexMap<String, String>) -> IndexMap<String, String> {
        let mut env = self.base_env();
        env.extend(engine_env);
        if let Some(agent) = self.workflow.agent_sandbox() {
            env.extend(agent.env.clone());
        }
        env.extend(self.workflow.engine.env.clone());
        for tool in self.workflow.safe_inputs.values() {
            for (key, value) in &tool.env {
                env.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let required = self.required_secrets();
        let allowed = secrets::filter_allowances(self.workflow, &required);
        secrets::filter_env_for_secrets(&env, &allowed)
    }

    pub fn required_secrets(&self) -> Vec<String> {
        secrets::required_secret_names(
            self.workflow,
            &self.profile.spec.capabilities,
            self.profile.credentials,
        )
    }

    pub fn allowed_domains(&self) -> Vec<String> {
        domains::compute_allowed_domains(self.workflow, self.profile.default_domains)
    }

    /// Command block lines for the active sandbox mode.
    pub fn command_lines(&self, native: &NativeCommand) -> EngineResult<Vec<String>> {
        let mut lines = vec!["set -o pipefail".to_string()];
        lines.extend(native.preamble.iter().cloned());
        match self.mode {
            SandboxMode::Direct => lines.push(format!(
                "{} 2>&1 | tee -a {}",
                native.command,
                shell_escape_arg(self.log_file)
            )),
            SandboxMode::Firewall => {
                let allowed = self.allowed_domains();
                let blocked = domains::compute_blocked_domains(self.workflow);
                let invocation = FirewallInvocation {
                    native_command: &native.command,
                    allowed_domains: &allowed,
                    blocked_domains: &blocked,
                    capabilities: &self.profile.spec.capabilities,
                    has_mcp_servers: self.has_mcp_servers(),
                };
                lines.extend(firewall::firewall_command_lines(
                    self.workflow,
                    invocation,
                    self.log_file,
                ));
            }
            SandboxMode::ProcessIsolation => {
                let allowed = self.allowed_domains();
                let blocked = domains::compute_blocked_domains(self.workflow);
                let policy = IsolationPolicy::new(&allowed, &blocked);
                lines.extend(isolation::isolation_command_lines(
                    &policy,
                    &native.command,
                    self.log_file,
                )?);
            }
        }
        Ok(lines)
    }

    /// The single execution step: wrapped command plus filtered environment.
    pub fn execution_step(
        &self,
        native: &NativeCommand,
        engine_env: IndexMap<String, String>,
    ) -> EngineResult<PipelineStep> {
        let lines = self.command_lines(native)?;
        let env = self.assemble_env(engine_env);
        Ok(
            PipelineStep::builder(format!("Execute {}", self.profile.spec.display_name()))
                .id(EXECUTION_STEP_ID)
                .timeout_minutes(
                    self.workflow
                        .timeout_minutes
                        .unwrap_or(DEFAULT_TIMEOUT_MINUTES),
                )
                .run_lines(lines)
                .envs(env)
                .build(),
        )
    }
}

/// Agent name passed to `--agent` of an agent file: `.github/agents/review.agent.md` -> `review`.
pub fn agent_stem(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.strip_suffix(".agent.md")
        .or_else(|| file.strip_suffix(".md"))
        .unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::EngineCapabilities;
    use pretty_assertions::assert_eq;

    fn spec() -> EngineSpec {
        EngineSpec::new("demo", "Demo Agent").with_capabilities(EngineCapabilities {
            firewall: true,
            max_turns: true,
            ..EngineCapabilities::default()
        })
    }

    fn profile(spec: &EngineSpec) -> EngineProfile<'_> {
        EngineProfile {
            spec,
            credentials: &["DEMO_API_KEY"],
            default_domains: &["api.demo.dev"],
            detection_model: Some("demo-mini"),
            mcp_config_path: Some("/tmp/gh-aw/mcp-config/demo.json"),
        }
    }

    fn parse(yaml: &str) -> WorkflowSpec {
        serde_yaml::from_str(yaml).expect("workflow parses")
    }

    #[test]
    fn model_argument_uses_variable_without_configured_model() {
        let spec = spec();
        let workflow = parse("safe-outputs:\n  create-issue:\n");
        let plan = ExecutionPlan::new(profile(&spec), &workflow, AGENT_STDIO_LOG);
        assert_eq!(
            plan.model_argument(|value| format!("--model {value}")),
            "${GH_AW_MODEL_AGENT_DEMO:+ --model \"$GH_AW_MODEL_AGENT_DEMO\"}"
        );
        let env = plan.base_env();
        assert_eq!(
            env.get("GH_AW_MODEL_AGENT_DEMO").map(String::as_str),
            Some("${{ vars.GH_AW_MODEL_AGENT_DEMO || '' }}")
        );
    }

    #[test]
    fn detection_jobs_fall_back_to_detection_model() {
        let spec = spec();
        let workflow = parse("engine: demo\n");
        let plan = ExecutionPlan::new(profile(&spec), &workflow, AGENT_STDIO_LOG);
        assert_eq!(
            plan.base_env()
                .get("GH_AW_MODEL_DETECTION_DEMO")
                .map(String::as_str),
            Some("${{ vars.GH_AW_MODEL_DETECTION_DEMO || 'demo-mini' }}")
        );
    }

    #[test]
    fn explicit_model_is_escaped_and_suppresses_variable() {
        let spec = spec();
        let workflow = parse("engine:\n  id: demo\n  model: big model\n");
        let plan = ExecutionPlan::new(profile(&spec), &workflow, AGENT_STDIO_LOG);
        assert_eq!(
            plan.model_argument(|value| format!("--model {value}")),
            "--model 'big model'"
        );
        assert!(!plan.base_env().keys().any(|key| key.starts_with("GH_AW_MODEL_")));
    }

    #[test]
    fn agent_file_prompt_strips_frontmatter() {
        let spec = spec();
        let workflow = parse("engine:\n  id: demo\n  agent: .github/agents/review.agent.md\n");
        let plan = ExecutionPlan::new(profile(&spec), &workflow, AGENT_STDIO_LOG);
        let prompt = plan.prompt_argument();
        assert!(prompt.starts_with("\"$(awk 'NR==1 && /^---$/ {fm=1; next}"));
        assert!(prompt.contains("\"${GITHUB_WORKSPACE}\"/.github/agents/review.agent.md"));
        assert!(prompt.ends_with(&format!("cat {PROMPT_PATH})\"")));
    }

    #[test]
    fn direct_mode_tees_to_log() {
        let spec = spec();
        let workflow = parse("engine: demo\n");
        let plan = ExecutionPlan::new(profile(&spec), &workflow, "/tmp/gh-aw/agent-stdio.log");
        assert_eq!(plan.mode, SandboxMode::Direct);
        let lines = plan
            .command_lines(&NativeCommand::new("demo run").with_preamble("mkdir -p /tmp/x"))
            .expect("lines");
        assert_eq!(
            lines,
            vec![
                "set -o pipefail",
                "mkdir -p /tmp/x",
                "demo run 2>&1 | tee -a /tmp/gh-aw/agent-stdio.log",
            ]
        );
    }

    #[test]
    fn environment_precedence_and_filtering() {
        let spec = spec();
        let workflow = parse(
            "engine:\n  id: demo\n  env:\n    GH_AW_PROMPT: /custom/prompt.txt\n    EXTRA: ${{ secrets.EXTRA }}\nsandbox:\n  agent:\n    env:\n      SANDBOX_ONLY: sandboxed\n      GH_AW_PROMPT: /sandbox/prompt.txt\nsafe-inputs:\n  tool:\n    run: echo\n    env:\n      GH_AW_PROMPT: ignored\n      LOOKUP: ${{ secrets.LOOKUP }}\n",
        );
        let plan = ExecutionPlan::new(profile(&spec), &workflow, AGENT_STDIO_LOG);
        let mut engine_env = IndexMap::new();
        engine_env.insert("STRAY".to_string(), "${{ secrets.UNRELATED }}".to_string());
        let env = plan.assemble_env(engine_env);

        assert_eq!(env.get("GH_AW_PROMPT").map(String::as_str), Some("/custom/prompt.txt"));
        assert_eq!(env.get("SANDBOX_ONLY").map(String::as_str), Some("sandboxed"));
        assert_eq!(env.get("EXTRA").map(String::as_str), Some("${{ secrets.EXTRA }}"));
        assert_eq!(env.get("LOOKUP").map(String::as_str), Some("${{ secrets.LOOKUP }}"));
        assert_eq!(
            env.get("DEMO_API_KEY").map(String::as_str),
            Some("${{ secrets.DEMO_API_KEY }}")
        );
        assert!(!env.contains_key("STRAY"));
    }

    #[test]
    fn max_turns_dropped_when_unsupported() {
        let spec = EngineSpec::new("plain", "Plain");
        let workflow = parse("engine:\n  id: plain\n  max-turns: 5\n");
        let plan = ExecutionPlan::new(profile(&spec), &workflow, AGENT_STDIO_LOG);
        assert_eq!(plan.max_turns(), None);
        assert!(!plan.base_env().contains_key("GH_AW_MAX_TURNS"));
    }

    #[test]
    fn installation_order_with_firewall() {
        let spec = spec();
        let workflow = parse("network:\n  allowed: [example.com]\n  firewall: true\n");
        let cli = CliPackage {
            package: "@demo/cli",
            version: "1.0.0",
            binary: "demo",
        };
        let steps = installation_steps(&spec, &workflow, &["DEMO_API_KEY"], &cli);
        let names: Vec<_> = steps.iter().filter_map(PipelineStep::name).collect();
        assert_eq!(
            names,
            vec![
                "Validate DEMO_API_KEY secret",
                "Setup Node.js",
                "Install awf binary",
                "Install Demo Agent",
            ]
        );
    }

    #[test]
    fn custom_command_skips_cli_install() {
        let spec = spec();
        let workflow = parse("engine:\n  id: demo\n  command: /opt/demo\n");
        let cli = CliPackage {
            package: "@demo/cli",
            version: "1.0.0",
            binary: "demo",
        };
        let steps = installation_steps(&spec, &workflow, &["DEMO_API_KEY"], &cli);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn agent_stem_strips_suffixes() {
        assert_eq!(agent_stem(".github/agents/review.agent.md"), "review");
        assert_eq!(agent_stem("helper.md"), "helper");
        assert_eq!(agent_stem("plain"), "plain");
    }
}
