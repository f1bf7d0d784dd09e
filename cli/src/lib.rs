//! Driver for compiling agentic workflow files into engine steps.

pub mod commands;
pub mod config;
pub mod workflow_file;

pub use config::DriverConfig;
pub use workflow_file::WorkflowDocument;
pub use workflow_file::WorkflowFileError;
pub use workflow_file::load_workflow;
