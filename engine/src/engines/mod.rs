//! Built-in engine implementations.

mod claude;
mod codex;
pub mod common;
mod copilot;
mod custom;
mod gemini;

pub use claude::ClaudeEngine;
pub use codex::CodexEngine;
pub use copilot::CopilotEngine;
pub use custom::CustomEngine;
pub use gemini::GeminiEngine;
