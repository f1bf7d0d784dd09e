use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::engines::ClaudeEngine;
use crate::engines::CodexEngine;
use crate::engines::CopilotEngine;
use crate::engines::CustomEngine;
use crate::engines::GeminiEngine;
use crate::error::EngineError;
use crate::error::EngineResult;
use crate::traits::AgenticEngine;
use crate::traits::Engine;

/// Engine used when a workflow names none.
pub const DEFAULT_ENGINE: &str = "copilot";

pub type EngineHandle = Arc<dyn AgenticEngine>;

static GLOBAL: Lazy<EngineCatalog> = Lazy::new(EngineCatalog::with_builtin_engines);

/// Identifier-to-engine mapping. Built once at startup, read-only afterwards.
#[derive(Default, Clone)]
pub struct EngineCatalog {
    engines: BTreeMap<String, EngineHandle>,
}

impl std::fmt::Debug for EngineCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCatalog")
            .field("engines", &self.ids())
            .finish()
    }
}

impl EngineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding Claude, Codex, Copilot, Gemini and the custom engine.
    pub fn with_builtin_engines() -> Self {
        let engines: [EngineHandle; 5] = [
            Arc::new(ClaudeEngine::new()),
            Arc::new(CodexEngine::new()),
            Arc::new(CopilotEngine::new()),
            Arc::new(GeminiEngine::new()),
            Arc::new(CustomEngine::new()),
        ];
        let mut catalog = Self::new();
        for engine in engines {
            let id = engine.id().to_string();
            catalog.engines.insert(id, engine);
        }
        debug!(engines = catalog.engines.len(), "engine catalog initialized");
        catalog
    }

    /// Process-wide catalog, initialized on first use.
    pub fn global() -> &'static EngineCatalog {
        &GLOBAL
    }

    pub fn register(&mut self, engine: EngineHandle) -> EngineResult<()> {
        let id = engine.id().to_string();
        if self.engines.contains_key(&id) {
            return Err(EngineError::DuplicateEngine(id));
        }
        self.engines.insert(id, engine);
        Ok(())
    }

    pub fn get(&self, id: &str) -> EngineResult<EngineHandle> {
        self.engines
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::unknown_engine(id))
    }

    /// Exact match, else the longest registered identifier that prefixes `id`
    /// (`codex-experimental` resolves to `codex`).
    pub fn get_by_prefix(&self, id: &str) -> EngineResult<EngineHandle> {
        if let Some(engine) = self.engines.get(id) {
            return Ok(Arc::clone(engine));
        }
        self.engines
            .iter()
            .filter(|(registered, _)| id.starts_with(registered.as_str()))
            .max_by_key(|(registered, _)| registered.len())
            .map(|(registered, engine)| {
                debug!(requested = id, resolved = %registered, "engine resolved by prefix");
                Arc::clone(engine)
            })
            .ok_or_else(|| EngineError::unknown_engine(id))
    }

    /// Registered identifiers in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    pub fn engines(&self) -> impl Iterator<Item = &EngineHandle> {
        self.engines.values()
    }

    pub fn default_engine(&self) -> EngineResult<EngineHandle> {
        self.get(DEFAULT_ENGINE)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
