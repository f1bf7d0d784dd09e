//! Secret-minimization filter and the install-time secret validation step.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::error::EngineError;
use crate::error::EngineResult;
use crate::mcp;
use crate::spec::EngineCapabilities;
use crate::step::PipelineStep;
use crate::workflow::WorkflowSpec;

/// Marker every secret-store reference carries.
pub const SECRET_MARKER: &str = "secrets.";

/// Token for the GitHub MCP server, in lookup order.
pub const GITHUB_MCP_SECRETS: &[&str] = &["GH_AW_GITHUB_MCP_SERVER_TOKEN", "GH_AW_GITHUB_TOKEN"];

/// Env key carrying the GitHub MCP server token into the agent step.
pub const GITHUB_MCP_TOKEN_KEY: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Key shared with the MCP gateway whenever any server is configured.
pub const MCP_GATEWAY_API_KEY: &str = "MCP_GATEWAY_API_KEY";

pub const SECRETS_DOCS_URL: &str =
    "https://githubnext.github.io/gh-aw/reference/engines/#available-coding-agents";

/// One `${{ ... }}` expression span.
#[allow(clippy::expect_used)]
static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{\{(.*?)\}\}").expect("valid expression regex"));

/// A `secrets.NAME` operand inside an expression.
#[allow(clippy::expect_used)]
static SECRET_OPERAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bsecrets\.([A-Za-z_][A-Za-z0-9_]*)").expect("valid secret regex")
});

#[allow(clippy::expect_used)]
static SIMPLE_SECRET_EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\{\s*secrets\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid secret regex")
});

/// `${{ secrets.NAME }}`
pub fn secret_expression(name: &str) -> String {
    format!("${{{{ secrets.{name} }}}}")
}

/// A value that names the secret store at all, parseable or not.
pub fn looks_like_secret_reference(value: &str) -> bool {
    value.contains("${{") && value.contains(SECRET_MARKER)
}

fn secret_operands(value: &str) -> impl Iterator<Item = &str> {
    EXPRESSION
        .captures_iter(value)
        .filter_map(|expression| expression.get(1))
        .flat_map(|body| SECRET_OPERAND.captures_iter(body.as_str()))
        .filter_map(|operand| operand.get(1))
        .map(|name| name.as_str())
}

/// Name of the first secret referenced by `value`.
pub fn secret_reference_name(value: &str) -> Option<&str> {
    secret_operands(value).next()
}

/// Every secret name referenced anywhere in `value`, including fallbacks
/// such as `${{ secrets.A || secrets.B }}`, first occurrence first.
pub fn referenced_secrets(value: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in secret_operands(value) {
        if !names.iter().any(|known| known == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace each `${{ secrets.NAME }}` in `value` with a `${NAME}` shell
/// placeholder. Returns the rewritten value and the names replaced.
pub fn externalize_secret_expressions(value: &str) -> (String, Vec<String>) {
    let names = SIMPLE_SECRET_EXPRESSION
        .captures_iter(value)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .collect();
    let rewritten = SIMPLE_SECRET_EXPRESSION
        .replace_all(value, "$${$1}")
        .into_owned();
    (rewritten, names)
}

/// Drop every entry whose value references a secret that neither its name nor
/// its key is permitted for. Values that are not secret references are kept.
/// Unparseable references degrade to non-secrets.
pub fn filter_env_for_secrets(
    env: &IndexMap<String, String>,
    allowed: &BTreeSet<String>,
) -> IndexMap<String, String> {
    let mut filtered = IndexMap::with_capacity(env.len());
    let mut removed = Vec::new();

    for (key, value) in env {
        if !looks_like_secret_reference(value) {
            filtered.insert(key.clone(), value.clone());
            continue;
        }
        match secret_reference_name(value) {
            Some(name) if allowed.contains(name) || allowed.contains(key) => {
                filtered.insert(key.clone(), value.clone());
            }
            Some(name) => {
                debug!(key = %key, secret = %name, "dropping secret not required by engine");
                removed.push(key.as_str());
            }
            None => {
                debug!(key = %key, "unparseable secret reference kept as literal");
                filtered.insert(key.clone(), value.clone());
            }
        }
    }

    if !removed.is_empty() {
        info!(
            kept = filtered.len(),
            removed = removed.len(),
            "secret references filtered from step environment"
        );
    }

    filtered
}

/// Secret names an engine needs for `workflow`, starting from its own
/// credentials.
pub fn required_secret_names(
    workflow: &WorkflowSpec,
    capabilities: &EngineCapabilities,
    engine_secrets: &[&str],
) -> Vec<String> {
    fn push(name: String, names: &mut Vec<String>) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let mut names: Vec<String> = engine_secrets.iter().map(|name| (*name).to_string()).collect();

    if workflow.tools.github.is_some() {
        for name in GITHUB_MCP_SECRETS {
            push((*name).to_string(), &mut names);
        }
        push(GITHUB_MCP_TOKEN_KEY.to_string(), &mut names);
    }
    if mcp::has_mcp_servers(workflow, capabilities) {
        push(MCP_GATEWAY_API_KEY.to_string(), &mut names);
    }
    for tool in workflow.safe_inputs.values() {
        for value in tool.env.values() {
            for name in referenced_secrets(value) {
                push(name, &mut names);
            }
        }
    }
    for server in workflow.mcp_servers.values() {
        for value in server.env.values().chain(server.headers.values()) {
            for name in referenced_secrets(value) {
                push(name, &mut names);
            }
        }
    }
    names
}

/// The permitted set handed to [`filter_env_for_secrets`]: required secret
/// names plus the keys the user explicitly set on the engine or sandbox.
pub fn filter_allowances(workflow: &WorkflowSpec, required: &[String]) -> BTreeSet<String> {
    let mut allowed: BTreeSet<String> = required.iter().cloned().collect();
    allowed.extend(workflow.engine.env.keys().cloned());
    if let Some(agent) = workflow.agent_sandbox() {
        allowed.extend(agent.env.keys().cloned());
    }
    allowed
}

/// Validation step that fails the job unless one of `candidates` is set.
/// An engine with no candidates is a wiring bug; it is logged and yields a
/// no-op step.
pub fn secret_validation_step(engine_name: &str, candidates: &[&str]) -> PipelineStep {
    match try_secret_validation_step(engine_name, candidates) {
        Ok(step) => step,
        Err(err) => {
            error!(error = %err, "skipping secret validation step");
            PipelineStep::noop()
        }
    }
}

fn try_secret_validation_step(
    engine_name: &str,
    candidates: &[&str],
) -> EngineResult<PipelineStep> {
    if candidates.is_empty() {
        return Err(EngineError::missing_secrets(engine_name));
    }

    let listed = candidates.join(" or ");
    let words = candidates.join(" ");
    let step = PipelineStep::builder(format!("Validate {listed} secret"))
        .id("validate-secret")
        .run_lines([
            "found=\"\"".to_string(),
            format!("for name in {words}; do"),
            "  if [ -n \"${!name:-}\" ]; then".to_string(),
            "    found=\"$name\"".to_string(),
            "    break".to_string(),
            "  fi".to_string(),
            "done".to_string(),
            "if [ -z \"$found\" ]; then".to_string(),
            format!("  echo \"Error: none of {listed} is set\" >&2"),
            format!("  echo \"The {engine_name} engine requires one of these secrets.\" >&2"),
            format!("  echo \"See {SECRETS_DOCS_URL}\" >&2"),
            "  {".to_string(),
            "    echo \"### Secret validation failed\"".to_string(),
            format!("    echo \"Set one of: {listed}\""),
            "  } >> \"$GITHUB_STEP_SUMMARY\"".to_string(),
            "  exit 1".to_string(),
            "fi".to_string(),
            "echo \"<details><summary>Secret $found found</summary></details>\" >> \"$GITHUB_STEP_SUMMARY\"".to_string(),
        ])
        .envs(
            candidates
                .iter()
                .map(|name| ((*name).to_string(), secret_expression(name))),
        )
        .build();
    Ok(step)
}
