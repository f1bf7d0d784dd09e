use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use aw_engine::CompileOptions;
use aw_engine::WorkflowSpec;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

const CONFIG_DIR_NAME: &str = "aw";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Driver defaults read from `config.toml`. Command-line flags win over these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Engine used when a workflow names none.
    pub default_engine: Option<String>,
    pub log_file: Option<String>,
    /// Firewall runner version for workflows that enable it without pinning.
    pub firewall_version: Option<String>,
}

impl DriverConfig {
    /// Loads `explicit` when given; otherwise the per-user config file, if any.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("no driver config found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        debug!(path = %path.display(), "loaded driver config");
        Ok(config)
    }

    /// Compile options for `workflow`. `engine` and `log_file` come from the command line.
    pub fn compile_options(
        &self,
        workflow: &WorkflowSpec,
        engine: Option<String>,
        log_file: Option<String>,
    ) -> CompileOptions {
        let engine = engine.or_else(|| {
            if workflow.engine.id.is_some() {
                None
            } else {
                self.default_engine.clone()
            }
        });
        CompileOptions {
            engine,
            log_file: log_file
                .or_else(|| self.log_file.clone())
                .unwrap_or_else(|| CompileOptions::default().log_file),
            firewall_version: self.firewall_version.clone(),
        }
    }
}
