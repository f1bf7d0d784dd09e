//! Resolved workflow configuration consumed by the engines.
//!
//! The surrounding compiler owns a [`WorkflowSpec`] for one compilation. Engines
//! only read it; the single exception is the firewall auto-enable decision that
//! [`crate::compiler::compile_engine_steps`] writes back into
//! [`NetworkPermissions::firewall`].

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Allow-list entry that disables network restrictions altogether.
pub const WILDCARD_DOMAIN: &str = "*";

/// Commands granted when `bash:` is declared without a list.
pub const DEFAULT_BASH_COMMANDS: &[&str] = &[
    "cat", "date", "echo", "grep", "head", "ls", "pwd", "sort", "tail", "uniq", "wc",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorkflowSpec {
    pub name: Option<String>,
    pub engine: EngineConfig,
    pub tools: ToolsConfig,
    pub mcp_servers: IndexMap<String, McpServerConfig>,
    pub network: Option<NetworkPermissions>,
    pub sandbox: Option<SandboxConfig>,
    pub safe_outputs: Option<SafeOutputsConfig>,
    pub safe_inputs: IndexMap<String, SafeInputTool>,
    pub runtimes: IndexMap<String, Option<RuntimeConfig>>,
    pub timeout_minutes: Option<u32>,
}

impl WorkflowSpec {
    /// A job without safe outputs only classifies; it never acts.
    pub fn is_detection_job(&self) -> bool {
        self.safe_outputs.is_none()
    }

    pub fn has_safe_outputs(&self) -> bool {
        self.safe_outputs.is_some()
    }

    pub fn has_safe_inputs(&self) -> bool {
        !self.safe_inputs.is_empty()
    }

    pub fn allowed_domains(&self) -> &[String] {
        self.network
            .as_ref()
            .map(|network| network.allowed.as_slice())
            .unwrap_or_default()
    }

    pub fn blocked_domains(&self) -> &[String] {
        self.network
            .as_ref()
            .map(|network| network.blocked.as_slice())
            .unwrap_or_default()
    }

    pub fn allows_all_domains(&self) -> bool {
        self.allowed_domains()
            .iter()
            .any(|domain| domain.trim() == WILDCARD_DOMAIN)
    }

    pub fn firewall(&self) -> Option<&FirewallConfig> {
        self.network
            .as_ref()
            .and_then(|network| network.firewall.as_ref())
    }

    pub fn agent_sandbox(&self) -> Option<&AgentSandboxConfig> {
        self.sandbox
            .as_ref()
            .and_then(|sandbox| sandbox.agent.as_ref())
    }

    pub fn sandbox_disabled(&self) -> bool {
        self.agent_sandbox().is_some_and(|agent| agent.disabled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEngineConfig", rename_all = "kebab-case")]
pub struct EngineConfig {
    pub id: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// Replaces the engine's executable; also skips the CLI install step.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
    /// Workspace-relative path of a custom agent markdown file.
    pub agent: Option<String>,
    /// Steps run verbatim by the custom engine.
    pub steps: Vec<CustomStep>,
}

impl EngineConfig {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEngineConfig {
    Id(String),
    Detailed(DetailedEngineConfig),
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct DetailedEngineConfig {
    id: Option<String>,
    version: Option<String>,
    model: Option<String>,
    max_turns: Option<u32>,
    command: Option<String>,
    args: Vec<String>,
    env: IndexMap<String, String>,
    agent: Option<String>,
    steps: Vec<CustomStep>,
}

impl From<RawEngineConfig> for EngineConfig {
    fn from(raw: RawEngineConfig) -> Self {
        match raw {
            RawEngineConfig::Id(id) => Self::with_id(id),
            RawEngineConfig::Detailed(detailed) => Self {
                id: detailed.id,
                version: detailed.version,
                model: detailed.model,
                max_turns: detailed.max_turns,
                command: detailed.command,
                args: detailed.args,
                env: detailed.env,
                agent: detailed.agent,
                steps: detailed.steps,
            },
        }
    }
}

/// A user-declared step executed by the custom engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CustomStep {
    pub name: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "if")]
    pub condition: Option<String>,
    pub uses: Option<String>,
    pub with: IndexMap<String, JsonValue>,
    pub run: Option<String>,
    pub env: IndexMap<String, String>,
    pub timeout_minutes: Option<u32>,
    pub continue_on_error: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ToolsConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub github: Option<GitHubToolConfig>,
    #[serde(deserialize_with = "bash_setting")]
    pub bash: Option<Vec<String>>,
    #[serde(deserialize_with = "presence_flag")]
    pub edit: bool,
    #[serde(deserialize_with = "presence_flag")]
    pub web_fetch: bool,
    #[serde(deserialize_with = "presence_flag")]
    pub web_search: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub playwright: Option<PlaywrightToolConfig>,
    /// Per tool-call timeout in seconds.
    pub timeout: Option<u64>,
    /// MCP server startup timeout in seconds.
    pub startup_timeout: Option<u64>,
}

impl ToolsConfig {
    pub fn bash_allows_everything(&self) -> bool {
        self.bash.as_ref().is_some_and(|commands| {
            commands
                .iter()
                .any(|command| matches!(command.trim(), "*" | ":*"))
        })
    }

    /// Declared bash commands; the default set when `bash:` carried no list.
    pub fn bash_commands(&self) -> Vec<String> {
        match &self.bash {
            None => Vec::new(),
            Some(commands) if commands.is_empty() => DEFAULT_BASH_COMMANDS
                .iter()
                .map(|command| (*command).to_string())
                .collect(),
            Some(commands) => commands.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GitHubToolConfig {
    pub allowed: Vec<String>,
    pub toolsets: Vec<String>,
    pub read_only: bool,
    pub mode: GitHubMcpMode,
    pub version: Option<String>,
}

impl Default for GitHubToolConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            toolsets: Vec::new(),
            read_only: true,
            mode: GitHubMcpMode::Local,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitHubMcpMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PlaywrightToolConfig {
    pub allowed_domains: Vec<String>,
    pub version: Option<String>,
}

/// A user-declared MCP server: stdio when `command`/`container` is set, HTTP when `url` is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct McpServerConfig {
    pub command: Option<String>,
    pub container: Option<String>,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
    pub url: Option<String>,
    pub headers: IndexMap<String, String>,
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNetwork", rename_all = "kebab-case")]
pub struct NetworkPermissions {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    pub firewall: Option<FirewallConfig>,
}

impl NetworkPermissions {
    pub fn allowing<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: domains.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNetwork {
    Keyword(String),
    Detailed(DetailedNetwork),
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct DetailedNetwork {
    allowed: Vec<String>,
    blocked: Vec<String>,
    #[serde(deserialize_with = "firewall_setting")]
    firewall: Option<FirewallConfig>,
}

impl From<RawNetwork> for NetworkPermissions {
    fn from(raw: RawNetwork) -> Self {
        match raw {
            RawNetwork::Keyword(keyword) => Self::allowing([keyword]),
            RawNetwork::Detailed(detailed) => Self {
                allowed: detailed.allowed,
                blocked: detailed.blocked,
                firewall: detailed.firewall,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FirewallConfig {
    pub enabled: bool,
    pub version: Option<String>,
    pub log_level: Option<String>,
    pub args: Vec<String>,
    pub ssl_bump: bool,
    pub allow_urls: Vec<String>,
}

impl FirewallConfig {
    /// Enabled with no other overrides; what auto-enablement synthesizes.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFirewall {
    Flag(bool),
    Keyword(String),
    Detailed(DetailedFirewall),
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DetailedFirewall {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    ssl_bump: bool,
    #[serde(default)]
    allow_urls: Vec<String>,
}

impl From<RawFirewall> for FirewallConfig {
    fn from(raw: RawFirewall) -> Self {
        match raw {
            RawFirewall::Flag(true) => Self::enabled(),
            RawFirewall::Flag(false) => Self::disabled(),
            RawFirewall::Keyword(keyword) => match keyword.trim() {
                "disable" | "disabled" | "false" | "off" => Self::disabled(),
                _ => Self::enabled(),
            },
            RawFirewall::Detailed(detailed) => Self {
                enabled: detailed.enabled,
                version: detailed.version,
                log_level: detailed.log_level,
                args: detailed.args,
                ssl_bump: detailed.ssl_bump,
                allow_urls: detailed.allow_urls,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SandboxConfig {
    #[serde(deserialize_with = "agent_sandbox_setting")]
    pub agent: Option<AgentSandboxConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxKind {
    /// Network firewall runner.
    #[serde(rename = "awf")]
    Firewall,
    /// Process-isolation runtime driven by a policy document.
    #[serde(rename = "srt")]
    ProcessIsolation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentSandboxConfig {
    #[serde(rename = "id")]
    pub kind: Option<SandboxKind>,
    pub disabled: bool,
    /// Replaces the sandbox runner invocation.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
    pub mounts: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAgentSandbox {
    Flag(bool),
    Kind(SandboxKind),
    Detailed(AgentSandboxConfig),
}

impl From<RawAgentSandbox> for AgentSandboxConfig {
    fn from(raw: RawAgentSandbox) -> Self {
        match raw {
            RawAgentSandbox::Flag(enabled) => Self {
                disabled: !enabled,
                ..Self::default()
            },
            RawAgentSandbox::Kind(kind) => Self {
                kind: Some(kind),
                ..Self::default()
            },
            RawAgentSandbox::Detailed(detailed) => detailed,
        }
    }
}

/// Only presence matters to the engines; the field rules live elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafeOutputsConfig(pub IndexMap<String, JsonValue>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SafeInputTool {
    pub description: Option<String>,
    pub run: Option<String>,
    pub script: Option<String>,
    pub inputs: IndexMap<String, JsonValue>,
    pub env: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    pub version: Option<String>,
}

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Some(
        Option::<T>::deserialize(deserializer)?.unwrap_or_default(),
    ))
}

/// `edit:` with no value turns the tool on; `edit: false` keeps it off.
fn presence_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(!matches!(value, Some(JsonValue::Bool(false))))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBash {
    Flag(bool),
    Commands(Vec<String>),
}

fn bash_setting<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawBash>::deserialize(deserializer)? {
        None => Some(Vec::new()),
        Some(RawBash::Flag(true)) => Some(vec!["*".to_string()]),
        Some(RawBash::Flag(false)) => None,
        Some(RawBash::Commands(commands)) => Some(commands),
    })
}

fn firewall_setting<'de, D>(deserializer: D) -> Result<Option<FirewallConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(
        Option::<RawFirewall>::deserialize(deserializer)?
            .map(FirewallConfig::from)
            .unwrap_or_else(FirewallConfig::enabled),
    ))
}

fn agent_sandbox_setting<'de, D>(deserializer: D) -> Result<Option<AgentSandboxConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawAgentSandbox>::deserialize(deserializer)?.map(AgentSandboxConfig::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> WorkflowSpec {
        serde_yaml::from_str(yaml).expect("workflow parses")
    }

    #[test]
    fn engine_accepts_plain_identifier() {
        let spec = parse("engine: claude\n");
        assert_eq!(spec.engine.id.as_deref(), Some("claude"));
        assert!(spec.engine.model.is_none());
    }

    #[test]
    fn engine_accepts_detailed_map() {
        let spec = parse(
            "engine:\n  id: codex\n  model: gpt-5\n  max-turns: 7\n  env:\n    FOO: bar\n",
        );
        assert_eq!(spec.engine.id.as_deref(), Some("codex"));
        assert_eq!(spec.engine.model(), Some("gpt-5"));
        assert_eq!(spec.engine.max_turns, Some(7));
        assert_eq!(spec.engine.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn null_tools_enable_with_defaults() {
        let spec = parse("tools:\n  github:\n  edit:\n  bash:\n  web-fetch:\n");
        let github = spec.tools.github.as_ref().expect("github enabled");
        assert!(github.read_only);
        assert_eq!(github.mode, GitHubMcpMode::Local);
        assert!(spec.tools.edit);
        assert!(spec.tools.web_fetch);
        assert!(!spec.tools.web_search);
        assert_eq!(spec.tools.bash_commands().len(), DEFAULT_BASH_COMMANDS.len());
    }

    #[test]
    fn bash_true_means_wildcard() {
        let spec = parse("tools:\n  bash: true\n");
        assert!(spec.tools.bash_allows_everything());
    }

    #[test]
    fn network_keyword_becomes_allowed_entry() {
        let spec = parse("network: defaults\n");
        assert_eq!(spec.allowed_domains(), ["defaults".to_string()]);
        assert!(spec.firewall().is_none());
    }

    #[test]
    fn firewall_forms() {
        let spec = parse("network:\n  allowed: [example.com]\n  firewall:\n");
        assert_eq!(spec.firewall(), Some(&FirewallConfig::enabled()));

        let spec = parse("network:\n  firewall: disable\n");
        assert_eq!(spec.firewall(), Some(&FirewallConfig::disabled()));

        let spec = parse(
            "network:\n  firewall:\n    version: v1.2.3\n    ssl-bump: true\n    allow-urls: [https://github.com/org/*]\n",
        );
        let firewall = spec.firewall().expect("firewall");
        assert!(firewall.enabled);
        assert!(firewall.ssl_bump);
        assert_eq!(firewall.version.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn sandbox_agent_forms() {
        let spec = parse("sandbox:\n  agent: false\n");
        assert!(spec.sandbox_disabled());

        let spec = parse("sandbox:\n  agent: srt\n");
        assert_eq!(
            spec.agent_sandbox().and_then(|agent| agent.kind),
            Some(SandboxKind::ProcessIsolation)
        );

        let spec = parse("sandbox:\n  agent:\n    id: awf\n    mounts: [/data:/data:ro]\n");
        let agent = spec.agent_sandbox().expect("agent sandbox");
        assert_eq!(agent.kind, Some(SandboxKind::Firewall));
        assert_eq!(agent.mounts, vec!["/data:/data:ro".to_string()]);
    }

    #[test]
    fn detection_job_has_no_safe_outputs() {
        assert!(parse("engine: copilot\n").is_detection_job());
        assert!(!parse("safe-outputs:\n  create-issue: {}\n").is_detection_job());
    }
}
