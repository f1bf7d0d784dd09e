use thiserror::Error;

pub type EngineResult<T, E = EngineError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown engine `{0}`")]
    UnknownEngine(String),

    #[error("engine `{0}` is already registered")]
    DuplicateEngine(String),

    #[error("engine `{engine}` declared no candidate secrets for its validation step")]
    MissingSecretConfiguration { engine: String },

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("failed to render {what} as JSON: {source}")]
    RenderJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to render {what} as TOML: {source}")]
    RenderToml {
        what: &'static str,
        #[source]
        source: toml::ser::Error,
    },
}

impl EngineError {
    pub fn unknown_engine(id: impl Into<String>) -> Self {
        Self::UnknownEngine(id.into())
    }

    pub fn missing_secrets(engine: impl Into<String>) -> Self {
        Self::MissingSecretConfiguration {
            engine: engine.into(),
        }
    }

    pub fn render_json(what: &'static str, source: serde_json::Error) -> Self {
        Self::RenderJson { what, source }
    }

    pub fn render_toml(what: &'static str, source: toml::ser::Error) -> Self {
        Self::RenderToml { what, source }
    }
}
