use serde::Serialize;

/// Port value meaning "this engine has no LLM gateway".
pub const NO_LLM_GATEWAY: i32 = -1;

/// Fixed capability flags of one engine. Never change after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineCapabilities {
    pub tools_allowlist: bool,
    pub http_transport: bool,
    pub max_turns: bool,
    pub web_fetch: bool,
    pub web_search: bool,
    pub firewall: bool,
    pub plugins: bool,
    pub llm_gateway_port: i32,
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self {
            tools_allowlist: false,
            http_transport: false,
            max_turns: false,
            web_fetch: false,
            web_search: false,
            firewall: false,
            plugins: false,
            llm_gateway_port: NO_LLM_GATEWAY,
        }
    }
}

/// Identity and capabilities of a registered engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSpec {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub experimental: bool,
    pub capabilities: EngineCapabilities,
}

impl EngineSpec {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: String::new(),
            experimental: false,
            capabilities: EngineCapabilities::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_experimental(mut self, experimental: bool) -> Self {
        self.experimental = experimental;
        self
    }

    pub fn with_capabilities(mut self, capabilities: EngineCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Suffix used in per-engine variable names (`GH_AW_MODEL_AGENT_<SUFFIX>`).
    pub fn env_suffix(&self) -> String {
        self.id
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_suffix_uppercases_and_replaces_separators() {
        let spec = EngineSpec::new("my-engine.v2", "Mine");
        assert_eq!(spec.env_suffix(), "MY_ENGINE_V2");
    }

    #[test]
    fn default_capabilities_have_no_gateway() {
        assert_eq!(EngineCapabilities::default().llm_gateway_port, NO_LLM_GATEWAY);
    }
}
