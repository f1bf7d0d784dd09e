//! Agentic engine abstraction and secure execution-step compiler.
//!
//! Each backend (Claude, Codex, Copilot, Gemini, custom steps) implements the
//! capability roles in [`traits`]; [`compile_engine_steps`] turns a
//! [`WorkflowSpec`] into installation, MCP setup and execution steps.

extern crate self as aw_engine;

pub mod catalog;
pub mod compiler;
pub mod engines;
mod error;
pub mod logs;
pub mod mcp;
pub mod sandbox;
pub mod secrets;
pub mod shell;
mod spec;
pub mod step;
mod telemetry;
mod traits;
pub mod workflow;

pub use aw_engine_derive::Engine;
pub use catalog::DEFAULT_ENGINE;
pub use catalog::EngineCatalog;
pub use catalog::EngineHandle;
pub use compiler::CompileOptions;
pub use compiler::CompiledEngineSteps;
pub use compiler::compile_engine_steps;
pub use error::EngineError;
pub use error::EngineResult;
pub use logs::LogMetrics;
pub use sandbox::SandboxMode;
pub use spec::EngineCapabilities;
pub use spec::EngineSpec;
pub use spec::NO_LLM_GATEWAY;
pub use step::PipelineStep;
pub use step::StepBuilder;
pub use traits::AgenticEngine;
pub use traits::CapabilityProvider;
pub use traits::CodingAgentEngine;
pub use traits::Engine;
pub use traits::LogParser;
pub use traits::McpConfigProvider;
pub use traits::SecurityProvider;
pub use traits::WorkflowExecutor;
pub use workflow::WorkflowSpec;
