//! MCP server resolution and per-engine configuration rendering.
//!
//! Secret-valued entries never reach a rendered document: each is replaced by
//! a `${NAME}` placeholder and the secret reference travels in the execution
//! step environment instead ([`ResolvedMcpServers::step_env`]).

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::error::EngineError;
use crate::error::EngineResult;
use crate::secrets;
use crate::spec::EngineCapabilities;
use crate::step::PipelineStep;
use crate::workflow::GitHubMcpMode;
use crate::workflow::GitHubToolConfig;
use crate::workflow::McpServerConfig;
use crate::workflow::WorkflowSpec;

pub const MCP_CONFIG_DIR: &str = "/tmp/gh-aw/mcp-config";
pub const MCP_LOGS_DIR: &str = "/tmp/gh-aw/mcp-logs";
pub const GITHUB_MCP_IMAGE: &str = "ghcr.io/github/github-mcp-server";
pub const DEFAULT_GITHUB_MCP_VERSION: &str = "v0.20.1";
pub const GITHUB_REMOTE_MCP_URL: &str = "https://api.githubcopilot.com/mcp/";
pub const PLAYWRIGHT_MCP_IMAGE: &str = "mcr.microsoft.com/playwright/mcp";
pub const WEB_FETCH_MCP_IMAGE: &str = "mcp/fetch";
pub const SAFE_OUTPUTS_SERVER: &str = "safeoutputs";
pub const SAFE_INPUTS_SERVER: &str = "safeinputs";
pub const SAFE_OUTPUTS_PATH: &str = "/tmp/gh-aw/safeoutputs/outputs.jsonl";
const GITHUB_TOKEN_EXPRESSION: &str =
    "${{ secrets.GH_AW_GITHUB_MCP_SERVER_TOKEN || secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";
const CONFIG_HEREDOC: &str = "GH_AW_MCP_CONFIG_EOF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpTransport {
    Stdio { command: String, args: Vec<String> },
    Http { url: String, headers: IndexMap<String, String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpServer {
    pub name: String,
    pub transport: McpTransport,
    /// Values are literals or `${KEY}` placeholders.
    pub env: IndexMap<String, String>,
    /// Tool names the agent may call; empty means every tool.
    pub allowed: Vec<String>,
}

impl McpServer {
    fn stdio(name: &str, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            transport: McpTransport::Stdio {
                command: command.into(),
                args,
            },
            env: IndexMap::new(),
            allowed: Vec::new(),
        }
    }

    fn http(name: &str, url: impl Into<String>, headers: IndexMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            transport: McpTransport::Http {
                url: url.into(),
                headers,
            },
            env: IndexMap::new(),
            allowed: Vec::new(),
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self.transport, McpTransport::Http { .. })
    }
}

/// Servers in resolution order plus the environment the execution step must
/// carry for their placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMcpServers {
    servers: Vec<McpServer>,
    step_env: IndexMap<String, String>,
    tool_timeout: Option<u64>,
    startup_timeout: Option<u64>,
}

impl ResolvedMcpServers {
    pub fn servers(&self) -> &[McpServer] {
        &self.servers
    }

    pub fn step_env(&self) -> &IndexMap<String, String> {
        &self.step_env
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|server| server.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&McpServer> {
        self.servers.iter().find(|server| server.name == name)
    }

    fn push(&mut self, server: McpServer) {
        self.servers.push(server);
    }

    /// Move secret-valued env entries into the step env, leaving `${KEY}`.
    fn externalize_env(&mut self, env: &IndexMap<String, String>) -> IndexMap<String, String> {
        env.iter()
            .map(|(key, value)| {
                if secrets::looks_like_secret_reference(value) {
                    self.insert_step_env(key, value.clone());
                    (key.clone(), format!("${{{key}}}"))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }

    /// Rewrite each secret expression in header values to `${NAME}`. A value
    /// holding any other expression over secrets moves whole into the step
    /// env under [`header_env_key`].
    fn externalize_headers(
        &mut self,
        server: &str,
        headers: &IndexMap<String, String>,
    ) -> IndexMap<String, String> {
        headers
            .iter()
            .map(|(header, value)| {
                let (rewritten, names) = secrets::externalize_secret_expressions(value);
                if secrets::looks_like_secret_reference(&rewritten) {
                    let key = header_env_key(server, header);
                    self.insert_step_env(&key, value.clone());
                    return (header.clone(), format!("${{{key}}}"));
                }
                for name in names {
                    let expression = secrets::secret_expression(&name);
                    self.insert_step_env(&name, expression);
                }
                (header.clone(), rewritten)
            })
            .collect()
    }

    fn insert_step_env(&mut self, key: &str, value: String) {
        if let Some(previous) = self.step_env.insert(key.to_string(), value.clone()) {
            if previous != value {
                warn!(key, "conflicting MCP secret bindings; last declaration wins");
            }
        }
    }
}

/// Resolve the workflow's tools into MCP servers for an engine.
pub fn resolve_mcp_servers(
    workflow: &WorkflowSpec,
    capabilities: &EngineCapabilities,
) -> ResolvedMcpServers {
    let mut resolved = ResolvedMcpServers {
        tool_timeout: workflow.tools.timeout,
        startup_timeout: workflow.tools.startup_timeout,
        ..ResolvedMcpServers::default()
    };

    if let Some(github) = &workflow.tools.github {
        let server = github_server(github, &mut resolved);
        resolved.push(server);
    }

    if let Some(playwright) = &workflow.tools.playwright {
        let version = playwright.version.as_deref().unwrap_or("latest");
        let mut origins: Vec<String> = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        origins.extend(playwright.allowed_domains.iter().cloned());
        let args = vec![
            "run".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            "--init".to_string(),
            format!("{PLAYWRIGHT_MCP_IMAGE}:{version}"),
            "--output-dir".to_string(),
            format!("{MCP_LOGS_DIR}/playwright"),
            "--allowed-origins".to_string(),
            origins.join(";"),
        ];
        resolved.push(McpServer::stdio("playwright", "docker", args));
    }

    for (name, config) in &workflow.mcp_servers {
        if let Some(server) = custom_server(name, config, &mut resolved) {
            resolved.push(server);
        }
    }

    if workflow.has_safe_outputs() {
        let mut server = McpServer::stdio(
            SAFE_OUTPUTS_SERVER,
            "node",
            vec!["/tmp/gh-aw/safeoutputs/mcp-server.cjs".to_string()],
        );
        server
            .env
            .insert("GH_AW_SAFE_OUTPUTS".to_string(), "${GH_AW_SAFE_OUTPUTS}".to_string());
        resolved.push(server);
    }

    if workflow.has_safe_inputs() {
        let mut server = McpServer::stdio(
            SAFE_INPUTS_SERVER,
            "node",
            vec!["/tmp/gh-aw/safe-inputs/mcp-server.cjs".to_string()],
        );
        for tool in workflow.safe_inputs.values() {
            let env = resolved.externalize_env(&tool.env);
            server.env.extend(env);
        }
        resolved.push(server);
    }

    if workflow.tools.web_fetch && !capabilities.web_fetch {
        debug!("engine lacks native web fetch; adding fetch MCP server");
        resolved.push(McpServer::stdio(
            "web-fetch",
            "docker",
            vec![
                "run".to_string(),
                "-i".to_string(),
                "--rm".to_string(),
                WEB_FETCH_MCP_IMAGE.to_string(),
            ],
        ));
    }

    if !capabilities.http_transport {
        let before = resolved.servers.len();
        resolved.servers.retain(|server| {
            if server.is_http() {
                warn!(
                    server = %server.name,
                    "engine does not support HTTP MCP transport; server dropped"
                );
                false
            } else {
                true
            }
        });
        if before != resolved.servers.len() {
            debug!(kept = resolved.servers.len(), "HTTP MCP servers removed");
        }
    }

    resolved
}

/// Step env key for a header value moved out whole, e.g. `DOCS_X_API_KEY`.
pub fn header_env_key(server: &str, header: &str) -> String {
    format!("{server}_{header}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether an engine with `capabilities` ends up with any MCP server.
pub fn has_mcp_servers(workflow: &WorkflowSpec, capabilities: &EngineCapabilities) -> bool {
    !resolve_mcp_servers(workflow, capabilities).is_empty()
}

fn github_server(github: &GitHubToolConfig, resolved: &mut ResolvedMcpServers) -> McpServer {
    resolved.insert_step_env(
        secrets::GITHUB_MCP_TOKEN_KEY,
        GITHUB_TOKEN_EXPRESSION.to_string(),
    );
    let token = format!("${{{}}}", secrets::GITHUB_MCP_TOKEN_KEY);
    let toolsets = if github.toolsets.is_empty() {
        "default".to_string()
    } else {
        github.toolsets.join(",")
    };

    let mut server = match github.mode {
        GitHubMcpMode::Remote => {
            let mut headers = IndexMap::new();
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            headers.insert("X-MCP-Toolsets".to_string(), toolsets);
            if github.read_only {
                headers.insert("X-MCP-Readonly".to_string(), "true".to_string());
            }
            McpServer::http("github", GITHUB_REMOTE_MCP_URL, headers)
        }
        GitHubMcpMode::Local => {
            let version = github
                .version
                .as_deref()
                .unwrap_or(DEFAULT_GITHUB_MCP_VERSION);
            let mut args = vec![
                "run".to_string(),
                "-i".to_string(),
                "--rm".to_string(),
                "-e".to_string(),
                secrets::GITHUB_MCP_TOKEN_KEY.to_string(),
                "-e".to_string(),
                "GITHUB_TOOLSETS".to_string(),
            ];
            if github.read_only {
                args.extend(["-e".to_string(), "GITHUB_READ_ONLY".to_string()]);
            }
            args.push(format!("{GITHUB_MCP_IMAGE}:{version}"));
            let mut server = McpServer::stdio("github", "docker", args);
            server
                .env
                .insert(secrets::GITHUB_MCP_TOKEN_KEY.to_string(), token);
            server.env.insert("GITHUB_TOOLSETS".to_string(), toolsets);
            if github.read_only {
                server
                    .env
                    .insert("GITHUB_READ_ONLY".to_string(), "1".to_string());
            }
            server
        }
    };
    server.allowed = github.allowed.clone();
    server
}

fn custom_server(
    name: &str,
    config: &McpServerConfig,
    resolved: &mut ResolvedMcpServers,
) -> Option<McpServer> {
    let env = resolved.externalize_env(&config.env);
    let mut server = if let Some(url) = &config.url {
        let headers = resolved.externalize_headers(name, &config.headers);
        McpServer::http(name, url.clone(), headers)
    } else if let Some(container) = &config.container {
        let mut args = vec!["run".to_string(), "-i".to_string(), "--rm".to_string()];
        for key in env.keys() {
            args.extend(["-e".to_string(), key.clone()]);
        }
        args.push(container.clone());
        args.extend(config.args.iter().cloned());
        McpServer::stdio(name, "docker", args)
    } else if let Some(command) = &config.command {
        McpServer::stdio(name, command.clone(), config.args.clone())
    } else {
        warn!(server = name, "MCP server declares neither command, container nor url; skipped");
        return None;
    };
    server.env = env;
    server.allowed = config.allowed.clone();
    Some(server)
}

/// Document layouts the engines consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpConfigFormat {
    /// `{"mcpServers": {..}}` with `type: http` for remote servers.
    Claude,
    /// Claude layout plus `type: local` and a `tools` list per server.
    Copilot,
    /// Settings file; remote servers use `httpUrl`.
    Gemini,
    /// `config.toml` with `[mcp_servers.<name>]` tables.
    Codex,
}

impl McpConfigFormat {
    pub fn render(self, resolved: &ResolvedMcpServers) -> EngineResult<String> {
        match self {
            Self::Codex => render_codex_toml(resolved),
            _ => {
                let mut servers = JsonMap::new();
                for server in resolved.servers() {
                    servers.insert(server.name.clone(), self.json_server(server));
                }
                serde_json::to_string_pretty(&json!({ "mcpServers": servers }))
                    .map_err(|err| EngineError::render_json("MCP configuration", err))
            }
        }
    }

    fn json_server(self, server: &McpServer) -> JsonValue {
        let mut entry = JsonMap::new();
        match &server.transport {
            McpTransport::Stdio { command, args } => {
                if self == Self::Copilot {
                    entry.insert("type".to_string(), json!("local"));
                }
                entry.insert("command".to_string(), json!(command));
                entry.insert("args".to_string(), json!(args));
                if !server.env.is_empty() {
                    entry.insert("env".to_string(), json!(server.env));
                }
            }
            McpTransport::Http { url, headers } => {
                match self {
                    Self::Gemini => {
                        entry.insert("httpUrl".to_string(), json!(url));
                    }
                    _ => {
                        entry.insert("type".to_string(), json!("http"));
                        entry.insert("url".to_string(), json!(url));
                    }
                }
                if !headers.is_empty() {
                    entry.insert("headers".to_string(), json!(headers));
                }
            }
        }
        if self == Self::Copilot {
            let tools = if server.allowed.is_empty() {
                vec!["*".to_string()]
            } else {
                server.allowed.clone()
            };
            entry.insert("tools".to_string(), json!(tools));
        }
        JsonValue::Object(entry)
    }
}

#[derive(Serialize)]
struct CodexConfig {
    history: CodexHistory,
    mcp_servers: IndexMap<String, CodexServer>,
}

#[derive(Serialize)]
struct CodexHistory {
    persistence: &'static str,
}

#[derive(Default, Serialize)]
struct CodexServer {
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env_vars: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearer_token_env_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    startup_timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enabled_tools: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    env: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    http_headers: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    env_http_headers: IndexMap<String, String>,
}

/// Name inside an exact `${NAME}` placeholder.
fn placeholder_name(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty() && !name.contains(['$', '{', '}']))
}

fn render_codex_toml(resolved: &ResolvedMcpServers) -> EngineResult<String> {
    let mut servers = IndexMap::new();
    for server in resolved.servers() {
        let mut entry = CodexServer {
            startup_timeout_sec: resolved.startup_timeout,
            tool_timeout_sec: resolved.tool_timeout,
            enabled_tools: server.allowed.clone(),
            ..CodexServer::default()
        };
        for (key, value) in &server.env {
            if placeholder_name(value) == Some(key.as_str()) {
                entry.env_vars.push(key.clone());
            } else {
                entry.env.insert(key.clone(), value.clone());
            }
        }
        match &server.transport {
            McpTransport::Stdio { command, args } => {
                entry.command = Some(command.clone());
                entry.args = args.clone();
            }
            McpTransport::Http { url, headers } => {
                entry.url = Some(url.clone());
                for (header, value) in headers {
                    let bearer = value.strip_prefix("Bearer ").and_then(placeholder_name);
                    if header.eq_ignore_ascii_case("authorization") && bearer.is_some() {
                        entry.bearer_token_env_var = bearer.map(str::to_string);
                    } else if let Some(name) = placeholder_name(value) {
                        entry.env_http_headers.insert(header.clone(), name.to_string());
                    } else {
                        entry.http_headers.insert(header.clone(), value.clone());
                    }
                }
            }
        }
        servers.insert(server.name.clone(), entry);
    }

    let config = CodexConfig {
        history: CodexHistory {
            persistence: "none",
        },
        mcp_servers: servers,
    };
    toml::to_string(&config).map_err(|err| EngineError::render_toml("codex MCP configuration", err))
}

/// "Setup MCPs" step writing `document` to `path` through a quoted heredoc.
pub fn mcp_setup_step(path: &str, document: &str) -> PipelineStep {
    let directory = path.rsplit_once('/').map_or(MCP_CONFIG_DIR, |(dir, _)| dir);
    PipelineStep::builder("Setup MCPs")
        .run_line(format!("mkdir -p {directory} {MCP_LOGS_DIR}"))
        .run_line(format!("cat > {path} << '{CONFIG_HEREDOC}'"))
        .script(document)
        .run_line(CONFIG_HEREDOC)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> WorkflowSpec {
        serde_yaml::from_str(yaml).expect("workflow parses")
    }

    fn full_capabilities() -> EngineCapabilities {
        EngineCapabilities {
            http_transport: true,
            web_fetch: true,
            ..EngineCapabilities::default()
        }
    }

    #[test]
    fn resolution_order_is_stable() {
        let workflow = parse(
            "tools:\n  github:\n  playwright:\nmcp-servers:\n  notion:\n    url: https://mcp.notion.com/mcp\nsafe-outputs:\n  create-issue:\nsafe-inputs:\n  lookup:\n    run: echo hi\n",
        );
        let resolved = resolve_mcp_servers(&workflow, &full_capabilities());
        assert_eq!(
            resolved.names().collect::<Vec<_>>(),
            vec!["github", "playwright", "notion", "safeoutputs", "safeinputs"]
        );
    }

    #[test]
    fn http_servers_dropped_without_transport() {
        let workflow = parse(
            "mcp-servers:\n  notion:\n    url: https://mcp.notion.com/mcp\n  local:\n    command: ./server\n",
        );
        let resolved = resolve_mcp_servers(&workflow, &EngineCapabilities::default());
        assert_eq!(resolved.names().collect::<Vec<_>>(), vec!["local"]);
    }

    #[test]
    fn web_fetch_fallback_only_without_native_support() {
        let workflow = parse("tools:\n  web-fetch:\n");
        assert!(resolve_mcp_servers(&workflow, &full_capabilities()).is_empty());
        let resolved = resolve_mcp_servers(&workflow, &EngineCapabilities::default());
        assert!(resolved.get("web-fetch").is_some());
    }

    #[test]
    fn secrets_are_externalized() {
        let workflow = parse(
            "mcp-servers:\n  notion:\n    url: https://mcp.notion.com/mcp\n    headers:\n      Authorization: Bearer ${{ secrets.NOTION_TOKEN }}\n  db:\n    command: db-mcp\n    env:\n      DB_PASSWORD: ${{ secrets.DB_PASSWORD }}\n      DB_HOST: localhost\n",
        );
        let resolved = resolve_mcp_servers(&workflow, &full_capabilities());
        let document = McpConfigFormat::Claude.render(&resolved).expect("renders");
        assert!(!document.contains("secrets."));
        assert!(document.contains("Bearer ${NOTION_TOKEN}"));
        assert!(document.contains("${DB_PASSWORD}"));
        assert_eq!(
            resolved.step_env().get("NOTION_TOKEN").map(String::as_str),
            Some("${{ secrets.NOTION_TOKEN }}")
        );
        assert_eq!(
            resolved.step_env().get("DB_PASSWORD").map(String::as_str),
            Some("${{ secrets.DB_PASSWORD }}")
        );
    }

    fn compound_header_workflow() -> WorkflowSpec {
        parse(
            "mcp-servers:\n  docs:\n    url: https://docs.example.com/mcp\n    headers:\n      X-Api-Key: ${{ secrets.DOCS_KEY || secrets.FALLBACK_KEY }}\n      Authorization: Bearer ${{ secrets.DOCS_TOKEN }}\n      X-Team: platform\n",
        )
    }

    #[test]
    fn compound_header_moves_whole_value_to_step_env() {
        let resolved = resolve_mcp_servers(&compound_header_workflow(), &full_capabilities());
        let document = McpConfigFormat::Claude.render(&resolved).expect("renders");
        assert!(!document.contains("secrets."));
        let value: JsonValue = serde_json::from_str(&document).expect("valid json");
        let headers = &value["mcpServers"]["docs"]["headers"];
        assert_eq!(headers["X-Api-Key"], json!("${DOCS_X_API_KEY}"));
        assert_eq!(headers["Authorization"], json!("Bearer ${DOCS_TOKEN}"));
        assert_eq!(headers["X-Team"], json!("platform"));
        assert_eq!(
            resolved.step_env().get("DOCS_X_API_KEY").map(String::as_str),
            Some("${{ secrets.DOCS_KEY || secrets.FALLBACK_KEY }}")
        );
        assert_eq!(
            resolved.step_env().get("DOCS_TOKEN").map(String::as_str),
            Some("${{ secrets.DOCS_TOKEN }}")
        );
    }

    #[test]
    fn codex_reads_externalized_headers_from_env() {
        let resolved = resolve_mcp_servers(&compound_header_workflow(), &full_capabilities());
        let document = McpConfigFormat::Codex.render(&resolved).expect("renders");
        assert!(!document.contains("secrets."));
        let value: toml::Table = toml::from_str(&document).expect("valid toml");
        let docs = &value["mcp_servers"]["docs"];
        assert_eq!(
            docs["bearer_token_env_var"].as_str(),
            Some("DOCS_TOKEN")
        );
        assert_eq!(
            docs["env_http_headers"]["X-Api-Key"].as_str(),
            Some("DOCS_X_API_KEY")
        );
        assert_eq!(docs["http_headers"]["X-Team"].as_str(), Some("platform"));
        assert!(docs["http_headers"].get("Authorization").is_none());
    }

    #[test]
    fn header_env_keys_are_shell_identifiers() {
        assert_eq!(header_env_key("docs", "X-Api-Key"), "DOCS_X_API_KEY");
        assert_eq!(
            header_env_key("my.server", "Authorization"),
            "MY_SERVER_AUTHORIZATION"
        );
    }

    #[test]
    fn github_local_server_uses_docker_and_token_placeholder() {
        let workflow = parse("tools:\n  github:\n    toolsets: [repos, issues]\n");
        let resolved = resolve_mcp_servers(&workflow, &full_capabilities());
        let github = resolved.get("github").expect("github server");
        let McpTransport::Stdio { command, args } = &github.transport else {
            panic!("expected stdio transport");
        };
        assert_eq!(command, "docker");
        assert_eq!(
            args.last().map(String::as_str),
            Some("ghcr.io/github/github-mcp-server:v0.20.1")
        );
        assert_eq!(
            github.env.get("GITHUB_TOOLSETS").map(String::as_str),
            Some("repos,issues")
        );
        assert!(resolved.step_env().contains_key(secrets::GITHUB_MCP_TOKEN_KEY));
    }

    #[test]
    fn copilot_json_carries_type_and_tools() {
        let workflow = parse("tools:\n  github:\n    allowed: [get_issue]\n");
        let resolved = resolve_mcp_servers(&workflow, &full_capabilities());
        let document = McpConfigFormat::Copilot.render(&resolved).expect("renders");
        let value: JsonValue = serde_json::from_str(&document).expect("valid json");
        assert_eq!(value["mcpServers"]["github"]["type"], json!("local"));
        assert_eq!(value["mcpServers"]["github"]["tools"], json!(["get_issue"]));
    }

    #[test]
    fn gemini_uses_http_url_key() {
        let workflow = parse("tools:\n  github:\n    mode: remote\n");
        let resolved = resolve_mcp_servers(&workflow, &full_capabilities());
        let document = McpConfigFormat::Gemini.render(&resolved).expect("renders");
        let value: JsonValue = serde_json::from_str(&document).expect("valid json");
        assert_eq!(
            value["mcpServers"]["github"]["httpUrl"],
            json!(GITHUB_REMOTE_MCP_URL)
        );
    }

    #[test]
    fn codex_toml_moves_placeholders_to_env_vars() {
        let workflow = parse(
            "tools:\n  github:\n    mode: remote\n  timeout: 90\nmcp-servers:\n  db:\n    command: db-mcp\n    env:\n      DB_PASSWORD: ${{ secrets.DB_PASSWORD }}\n      DB_HOST: localhost\n",
        );
        let resolved = resolve_mcp_servers(&workflow, &full_capabilities());
        let document = McpConfigFormat::Codex.render(&resolved).expect("renders");
        let value: toml::Table = toml::from_str(&document).expect("valid toml");
        let db = &value["mcp_servers"]["db"];
        assert_eq!(db["env_vars"].as_array().map(Vec::len), Some(1));
        assert_eq!(db["env"]["DB_HOST"].as_str(), Some("localhost"));
        assert_eq!(db["tool_timeout_sec"].as_integer(), Some(90));
        let github = &value["mcp_servers"]["github"];
        assert_eq!(
            github["bearer_token_env_var"].as_str(),
            Some(secrets::GITHUB_MCP_TOKEN_KEY)
        );
        assert_eq!(value["history"]["persistence"].as_str(), Some("none"));
    }

    #[test]
    fn setup_step_writes_quoted_heredoc() {
        let step = mcp_setup_step("/tmp/gh-aw/mcp-config/mcp-servers.json", "{\n}");
        assert_eq!(step.name(), Some("Setup MCPs"));
        assert_eq!(
            step.run(),
            [
                "mkdir -p /tmp/gh-aw/mcp-config /tmp/gh-aw/mcp-logs",
                "cat > /tmp/gh-aw/mcp-config/mcp-servers.json << 'GH_AW_MCP_CONFIG_EOF'",
                "{",
                "}",
                "GH_AW_MCP_CONFIG_EOF",
            ]
        );
    }
}
