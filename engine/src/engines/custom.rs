//! Pass-through engine running the workflow's own `engine.steps`.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::Engine;
use crate::engines::common;
use crate::engines::common::EngineProfile;
use crate::engines::common::ExecutionPlan;
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
use crate::step::StepBuilder;
use crate::traits::AgenticEngine;
use crate::traits::LogParser;
use crate::traits::McpConfigProvider;
use crate::traits::SecurityProvider;
use crate::traits::WorkflowExecutor;
use crate::workflow::CustomStep;
use crate::workflow::WorkflowSpec;

pub const CUSTOM_MCP_CONFIG_PATH: &str = "/tmp/gh-aw/mcp-config/mcp-servers.json";

#[derive(Debug, Clone, Engine)]
pub struct CustomEngine {
    spec: EngineSpec,
}

impl Default for CustomEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomEngine {
    pub fn new() -> Self {
        Self {
            spec: EngineSpec::new("custom", "Custom Steps")
                .with_description("Executes user-defined pipeline steps")
                .with_capabilities(EngineCapabilities {
                    max_turns: true,
                    llm_gateway_port: NO_LLM_GATEWAY,
                    ..EngineCapabilities::default()
                }),
        }
    }

    fn profile(&self) -> EngineProfile<'_> {
        EngineProfile {
            spec: &self.spec,
            credentials: &[],
            default_domains: &[],
            detection_model: None,
            mcp_config_path: Some(CUSTOM_MCP_CONFIG_PATH),
        }
    }

    /// Variables injected into every user step.
    fn injected_env(&self, plan: &ExecutionPlan<'_>) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        env.insert("GH_AW_PROMPT".to_string(), common::PROMPT_PATH.to_string());
        if plan.has_mcp_servers() {
            env.insert("GH_AW_MCP_CONFIG".to_string(), CUSTOM_MCP_CONFIG_PATH.to_string());
            for (key, value) in plan.mcp.step_env() {
                env.insert(key.clone(), value.clone());
            }
        }
        if plan.workflow.has_safe_outputs() {
            env.insert(
                "GH_AW_SAFE_OUTPUTS".to_string(),
                mcp::SAFE_OUTPUTS_PATH.to_string(),
            );
        }
        if let Some(max_turns) = plan.max_turns() {
            env.insert("GH_AW_MAX_TURNS".to_string(), max_turns.to_string());
        }
        env
    }

    fn user_step(&self, plan: &ExecutionPlan<'_>, step: &CustomStep) -> PipelineStep {
        let mut env = self.injected_env(plan);
        env.extend(step.env.clone());

        let mut allowed = secrets::filter_allowances(plan.workflow, &plan.required_secrets());
        allowed.extend(step.env.keys().cloned());
        let env = secrets::filter_env_for_secrets(&env, &allowed);

        let mut builder = match &step.name {
            Some(name) => StepBuilder::new(name.clone()),
            None => StepBuilder::unnamed(),
        };
        if let Some(id) = &step.id {
            builder = builder.id(id.clone());
        }
        if let Some(condition) = &step.condition {
            builder = builder.condition(condition.clone());
        }
        if let Some(uses) = &step.uses {
            builder = builder.uses(uses.clone());
        }
        for (key, value) in &step.with {
            builder = builder.with_input(key.clone(), input_value(value));
        }
        if let Some(run) = &step.run {
            builder = builder.script(run);
        }
        if let Some(continue_on_error) = step.continue_on_error {
            builder = builder.continue_on_error(continue_on_error);
        }
        builder
            .timeout_minutes(step.timeout_minutes)
            .envs(env)
            .build()
    }

    fn log_capture_step(&self, log_file: &str) -> PipelineStep {
        let log_file = shell_escape_arg(log_file);
        PipelineStep::builder("Ensure log file exists")
            .run_lines([
                format!("mkdir -p \"$(dirname {log_file})\""),
                format!("touch {log_file}"),
                format!("echo \"Custom steps execution completed\" >> {log_file}"),
            ])
            .build()
    }
}

fn input_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

impl WorkflowExecutor for CustomEngine {
    fn installation_steps(&self, _workflow: &WorkflowSpec) -> Vec<PipelineStep> {
        Vec::new()
    }

    fn execution_steps(
        &self,
        workflow: &WorkflowSpec,
        log_file: &str,
    ) -> EngineResult<Vec<PipelineStep>> {
        let plan = ExecutionPlan::new(self.profile(), workflow, log_file);
        let mut steps: Vec<PipelineStep> = workflow
            .engine
            .steps
            .iter()
            .map(|step| self.user_step(&plan, step))
            .collect();
        if steps.is_empty() {
            steps.push(self.log_capture_step(log_file));
        }
        Ok(steps)
    }
}

impl McpConfigProvider for CustomEngine {
    fn mcp_config_path(&self) -> &str {
        CUSTOM_MCP_CONFIG_PATH
    }

    fn render_mcp_config(
        &self,
        _workflow: &WorkflowSpec,
        servers: &ResolvedMcpServers,
    ) -> EngineResult<PipelineStep> {
        let document = McpConfigFormat::Claude.render(servers)?;
        Ok(mcp::mcp_setup_step(CUSTOM_MCP_CONFIG_PATH, &document))
    }
}

impl LogParser for CustomEngine {
    fn parse_log_metrics(&self, log: &str) -> LogMetrics {
        logs::parse_plain_log(log)
    }

    fn log_parser_script_id(&self) -> &str {
        "parse_custom_log"
    }

    fn log_file_for_parsing(&self) -> &str {
        common::AGENT_STDIO_LOG
    }
}

impl SecurityProvider for CustomEngine {
    fn required_secret_names(&self, workflow: &WorkflowSpec) -> Vec<String> {
        secrets::required_secret_names(workflow, &self.spec.capabilities, &[])
    }

    fn allowed_domains(&self, workflow: &WorkflowSpec) -> Vec<String> {
        domains::compute_allowed_domains(workflow, &[])
    }
}

impl AgenticEngine for CustomEngine {
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
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> WorkflowSpec {
        serde_yaml::from_str(yaml).expect("workflow parses")
    }

    #[test]
    fn no_steps_yields_log_capture() {
        let engine = CustomEngine::new();
        let steps = engine
            .execution_steps(&WorkflowSpec::default(), "/tmp/gh-aw/agent-stdio.log")
            .expect("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(
            steps[0].run(),
            &[
                "mkdir -p \"$(dirname /tmp/gh-aw/agent-stdio.log)\"".to_string(),
                "touch /tmp/gh-aw/agent-stdio.log".to_string(),
                "echo \"Custom steps execution completed\" >> /tmp/gh-aw/agent-stdio.log"
                    .to_string(),
            ]
        );
        assert!(engine.installation_steps(&WorkflowSpec::default()).is_empty());
    }

    #[test]
    fn user_steps_are_passed_through_with_injected_env() {
        let engine = CustomEngine::new();
        let workflow = parse(
            r#"engine:
  id: custom
  max-turns: 4
  steps:
    - name: Run agent
      if: github.event_name == 'issues'
      uses: acme/agent-action@v1
      with:
        retries: 3
        mode: fast
      env:
        ACME_TOKEN: ${{ secrets.ACME_TOKEN }}
        LEAKED: ${{ secrets.NOT_NEEDED }}
    - run: |
        echo one
        echo two
safe-outputs:
  create-issue:
"#,
        );
        let steps = engine
            .execution_steps(&workflow, common::AGENT_STDIO_LOG)
            .expect("steps");
        assert_eq!(steps.len(), 2);

        let first = &steps[0];
        assert_eq!(first.name(), Some("Run agent"));
        assert_eq!(first.condition(), Some("github.event_name == 'issues'"));
        assert_eq!(first.uses(), Some("acme/agent-action@v1"));
        assert_eq!(first.with_inputs().get("retries").map(String::as_str), Some("3"));
        let env = first.env();
        assert_eq!(env.get("GH_AW_MAX_TURNS").map(String::as_str), Some("4"));
        assert_eq!(
            env.get("GH_AW_SAFE_OUTPUTS").map(String::as_str),
            Some(mcp::SAFE_OUTPUTS_PATH)
        );
        assert_eq!(
            env.get("GH_AW_MCP_CONFIG").map(String::as_str),
            Some(CUSTOM_MCP_CONFIG_PATH)
        );
        assert!(env.contains_key("ACME_TOKEN"));
        assert!(env.contains_key("LEAKED"));

        let second = &steps[1];
        assert_eq!(second.name(), None);
        assert_eq!(second.run(), &["echo one".to_string(), "echo two".to_string()]);
    }

    #[test]
    fn no_detection_model() {
        let engine = CustomEngine::new();
        assert_eq!(engine.default_detection_model(), None);
    }
}
