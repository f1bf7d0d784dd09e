//! Subcommand implementations. Each returns the text to print on stdout.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use aw_engine::EngineCatalog;
use aw_engine::EngineHandle;
use aw_engine::EngineSpec;
use aw_engine::WorkflowSpec;
use aw_engine::compile_engine_steps;
use aw_engine::compiler::selected_engine_id;
use aw_engine::sandbox::domains::compute_blocked_domains;
use serde_json::to_string_pretty;
use tracing::debug;

use crate::config::DriverConfig;
use crate::workflow_file::WorkflowDocument;
use crate::workflow_file::load_workflow;

pub struct CompileArgs<'a> {
    pub workflow: &'a Path,
    pub engine: Option<String>,
    pub log_file: Option<String>,
    pub json: bool,
}

pub fn list_engines(catalog: &EngineCatalog, json: bool) -> Result<String> {
    if json {
        let specs: Vec<&EngineSpec> = catalog.engines().map(|engine| engine.spec()).collect();
        return Ok(to_string_pretty(&specs)?);
    }

    let mut out = String::new();
    for engine in catalog.engines() {
        let spec = engine.spec();
        let _ = write!(out, "{:<8} {}", spec.id(), spec.display_name());
        if spec.experimental {
            out.push_str(" (experimental)");
        }
        if !spec.description().is_empty() {
            let _ = write!(out, ": {}", spec.description());
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn compile(
    catalog: &EngineCatalog,
    config: &DriverConfig,
    args: CompileArgs<'_>,
) -> Result<String> {
    let WorkflowDocument { mut spec, .. } = read_workflow(args.workflow)?;
    let options = config.compile_options(&spec, args.engine, args.log_file);
    let compiled = compile_engine_steps(catalog, &mut spec, &options)
        .with_context(|| format!("failed to compile {}", args.workflow.display()))?;
    debug!(engine = %compiled.engine_id, steps = compiled.steps().count(), "compiled workflow");

    if args.json {
        Ok(to_string_pretty(&compiled)?)
    } else {
        Ok(compiled.to_yaml())
    }
}

pub fn secrets(catalog: &EngineCatalog, config: &DriverConfig, workflow: &Path) -> Result<String> {
    let WorkflowDocument { spec, .. } = read_workflow(workflow)?;
    let engine = resolve_engine(catalog, config, &spec)?;
    let provider = engine
        .as_security_provider()
        .ok_or_else(|| anyhow!("engine `{}` does not declare secrets", engine.id()))?;
    Ok(lines(provider.required_secret_names(&spec)))
}

pub fn domains(catalog: &EngineCatalog, config: &DriverConfig, workflow: &Path) -> Result<String> {
    let WorkflowDocument { spec, .. } = read_workflow(workflow)?;
    let engine = resolve_engine(catalog, config, &spec)?;
    let provider = engine
        .as_security_provider()
        .ok_or_else(|| anyhow!("engine `{}` does not declare network access", engine.id()))?;

    let mut out = String::from("allowed:\n");
    for domain in provider.allowed_domains(&spec) {
        let _ = writeln!(out, "  {domain}");
    }
    let blocked = compute_blocked_domains(&spec);
    if !blocked.is_empty() {
        out.push_str("blocked:\n");
        for domain in blocked {
            let _ = writeln!(out, "  {domain}");
        }
    }
    Ok(out)
}

fn read_workflow(path: &Path) -> Result<WorkflowDocument> {
    load_workflow(path).with_context(|| format!("failed to load workflow {}", path.display()))
}

fn resolve_engine(
    catalog: &EngineCatalog,
    config: &DriverConfig,
    spec: &WorkflowSpec,
) -> Result<EngineHandle> {
    let options = config.compile_options(spec, None, None);
    Ok(catalog.get_by_prefix(selected_engine_id(spec, &options))?)
}

fn lines(items: Vec<String>) -> String {
    items.into_iter().map(|item| format!("{item}\n")).collect()
}
