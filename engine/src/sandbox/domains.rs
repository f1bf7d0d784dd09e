//! Domain allow/block list computation for the sandboxed agent.

use std::collections::BTreeSet;

use tracing::debug;
use url::Url;

use crate::workflow::GitHubMcpMode;
use crate::workflow::WorkflowSpec;

/// Loopback entries every allow-list carries so locally started MCP servers
/// stay reachable from inside the sandbox.
pub const LOOPBACK_DOMAINS: [&str; 4] = ["localhost", "localhost:*", "127.0.0.1", "127.0.0.1:*"];

pub const DEFAULTS_ECOSYSTEM: &str = "defaults";

/// Remote GitHub MCP endpoint host.
pub const GITHUB_REMOTE_MCP_HOST: &str = "api.githubcopilot.com";

const ECOSYSTEMS: &[(&str, &[&str])] = &[
    (
        "defaults",
        &[
            "crl3.digicert.com",
            "crl4.digicert.com",
            "ocsp.digicert.com",
            "crl.geotrust.com",
            "ocsp.geotrust.com",
            "crl.globalsign.com",
            "ocsp.globalsign.com",
            "json-schema.org",
            "json.schemastore.org",
            "archive.ubuntu.com",
            "security.ubuntu.com",
            "azure.archive.ubuntu.com",
            "ppa.launchpad.net",
            "keyserver.ubuntu.com",
            "packages.microsoft.com",
            "packagecloud.io",
        ],
    ),
    (
        "github",
        &[
            "github.com",
            "api.github.com",
            "codeload.github.com",
            "uploads.github.com",
            "lfs.github.com",
            "raw.githubusercontent.com",
            "objects.githubusercontent.com",
            "github-cloud.githubusercontent.com",
            "github-cloud.s3.amazonaws.com",
        ],
    ),
    (
        "node",
        &[
            "registry.npmjs.org",
            "npmjs.org",
            "npmjs.com",
            "registry.yarnpkg.com",
            "yarnpkg.com",
            "nodejs.org",
            "deb.nodesource.com",
            "get.pnpm.io",
            "bun.sh",
        ],
    ),
    (
        "python",
        &[
            "pypi.org",
            "pypi.python.org",
            "files.pythonhosted.org",
            "bootstrap.pypa.io",
            "conda.anaconda.org",
            "repo.anaconda.com",
            "astral.sh",
        ],
    ),
    (
        "go",
        &[
            "proxy.golang.org",
            "sum.golang.org",
            "go.dev",
            "golang.org",
            "pkg.go.dev",
            "storage.googleapis.com",
        ],
    ),
    (
        "rust",
        &[
            "crates.io",
            "index.crates.io",
            "static.crates.io",
            "static.rust-lang.org",
            "sh.rustup.rs",
        ],
    ),
    (
        "java",
        &[
            "repo.maven.apache.org",
            "repo1.maven.org",
            "central.sonatype.com",
            "plugins.gradle.org",
            "services.gradle.org",
            "downloads.gradle.org",
        ],
    ),
    (
        "containers",
        &[
            "ghcr.io",
            "docker.io",
            "registry.hub.docker.com",
            "auth.docker.io",
            "production.cloudflare.docker.com",
            "quay.io",
            "mcr.microsoft.com",
            "gcr.io",
        ],
    ),
    (
        "dotnet",
        &[
            "nuget.org",
            "api.nuget.org",
            "dist.nuget.org",
            "dotnet.microsoft.com",
            "builds.dotnet.microsoft.com",
            "dotnetcli.blob.core.windows.net",
        ],
    ),
    (
        "ruby",
        &[
            "rubygems.org",
            "api.rubygems.org",
            "index.rubygems.org",
            "bundler.rubygems.org",
        ],
    ),
    (
        "playwright",
        &[
            "playwright.download.prss.microsoft.com",
            "cdn.playwright.dev",
            "playwright.azureedge.net",
        ],
    ),
];

/// Hosts of a named ecosystem.
pub fn ecosystem_domains(name: &str) -> Option<&'static [&'static str]> {
    ECOSYSTEMS
        .iter()
        .find(|(ecosystem, _)| *ecosystem == name)
        .map(|(_, domains)| *domains)
}

pub fn ecosystem_names() -> impl Iterator<Item = &'static str> {
    ECOSYSTEMS.iter().map(|(name, _)| *name)
}

/// Ecosystem implied by a runtime name or a bash command's first word.
fn ecosystem_for_tool(tool: &str) -> Option<&'static str> {
    let ecosystem = match tool {
        "node" | "npm" | "npx" | "pnpm" | "yarn" | "bun" | "deno" => "node",
        "python" | "python3" | "pip" | "pip3" | "uv" | "uvx" => "python",
        "go" => "go",
        "rust" | "cargo" | "rustup" => "rust",
        "java" | "mvn" | "gradle" => "java",
        "dotnet" => "dotnet",
        "ruby" | "gem" | "bundle" => "ruby",
        "docker" => "containers",
        _ => return None,
    };
    Some(ecosystem)
}

/// Ecosystems detected from declared runtimes, bash commands and tools,
/// sorted and deduplicated.
pub fn detect_ecosystems(workflow: &WorkflowSpec) -> Vec<&'static str> {
    let mut found = BTreeSet::new();
    for runtime in workflow.runtimes.keys() {
        if let Some(ecosystem) = ecosystem_for_tool(runtime.trim()) {
            found.insert(ecosystem);
        }
    }
    for command in workflow.tools.bash_commands() {
        let program = command
            .split(|c: char| c.is_whitespace() || c == ':')
            .next()
            .unwrap_or_default();
        if let Some(ecosystem) = ecosystem_for_tool(program) {
            found.insert(ecosystem);
        }
    }
    if workflow.tools.playwright.is_some() {
        found.insert("playwright");
    }
    found.into_iter().collect()
}

/// Hosts of HTTP-transport MCP servers declared in the workflow.
pub fn mcp_server_hosts(workflow: &WorkflowSpec) -> Vec<String> {
    let mut hosts = Vec::new();
    if workflow
        .tools
        .github
        .as_ref()
        .is_some_and(|github| github.mode == GitHubMcpMode::Remote)
    {
        hosts.push(GITHUB_REMOTE_MCP_HOST.to_string());
    }
    for (name, server) in &workflow.mcp_servers {
        let Some(url) = server.url.as_deref() else {
            continue;
        };
        match Url::parse(url) {
            Ok(parsed) => {
                if let Some(host) = parsed.host_str() {
                    hosts.push(host.to_string());
                }
            }
            Err(err) => debug!(server = %name, error = %err, "ignoring unparsable MCP server url"),
        }
    }
    hosts
}

/// Allow-list for one engine: engine defaults, explicit entries (ecosystem
/// names expanded), MCP server hosts, detected ecosystems, and loopback.
/// Normalized, deduplicated and sorted.
pub fn compute_allowed_domains(workflow: &WorkflowSpec, engine_defaults: &[&str]) -> Vec<String> {
    let mut domains = BTreeSet::new();
    let mut add = |entry: &str| {
        if let Some(domain) = normalize(entry) {
            domains.insert(domain);
        }
    };

    for domain in engine_defaults {
        add(domain);
    }

    let explicit = workflow.allowed_domains();
    if workflow.network.is_none() {
        expand_entry(DEFAULTS_ECOSYSTEM, &mut add);
    }
    for entry in explicit {
        expand_entry(entry, &mut add);
    }
    for host in mcp_server_hosts(workflow) {
        add(&host);
    }
    for ecosystem in detect_ecosystems(workflow) {
        expand_entry(ecosystem, &mut add);
    }
    if let Some(playwright) = &workflow.tools.playwright {
        for domain in &playwright.allowed_domains {
            add(domain);
        }
    }
    for loopback in LOOPBACK_DOMAINS {
        add(loopback);
    }

    domains.into_iter().collect()
}

/// Explicit deny list, ecosystem names expanded. Empty when nothing is blocked.
pub fn compute_blocked_domains(workflow: &WorkflowSpec) -> Vec<String> {
    let mut domains = BTreeSet::new();
    let mut add = |entry: &str| {
        if let Some(domain) = normalize(entry) {
            domains.insert(domain);
        }
    };
    for entry in workflow.blocked_domains() {
        expand_entry(entry, &mut add);
    }
    domains.into_iter().collect()
}

fn expand_entry(entry: &str, add: &mut impl FnMut(&str)) {
    match ecosystem_domains(entry.trim()) {
        Some(hosts) => {
            for host in hosts {
                add(host);
            }
        }
        None => add(entry),
    }
}

fn normalize(entry: &str) -> Option<String> {
    let trimmed = entry.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_ascii_lowercase())
}
