use std::path::PathBuf;

use anyhow::Result;
use aw_cli::DriverConfig;
use aw_cli::commands;
use aw_cli::commands::CompileArgs;
use aw_engine::EngineCatalog;
use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aw")]
#[command(about = "Compile agentic workflows into CI execution steps")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Driver configuration file (defaults to the per-user config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered engines.
    Engines {
        #[arg(long)]
        json: bool,
    },

    /// Compile a workflow into installation, MCP setup and execution steps.
    Compile {
        /// Workflow markdown file with YAML frontmatter.
        workflow: PathBuf,

        /// Engine to use instead of the workflow's own.
        #[arg(short, long)]
        engine: Option<String>,

        /// File the agent's output is tee'd into.
        #[arg(long)]
        log_file: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print the secret names the workflow's engine needs, one per line.
    Secrets { workflow: PathBuf },

    /// Print the network allow and block lists for the workflow.
    Domains { workflow: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = DriverConfig::load(cli.config.as_deref())?;
    let catalog = EngineCatalog::global();

    let output = match cli.command {
        Command::Engines { json } => commands::list_engines(catalog, json)?,
        Command::Compile {
            workflow,
            engine,
            log_file,
            json,
        } => commands::compile(
            catalog,
            &config,
            CompileArgs {
                workflow: &workflow,
                engine,
                log_file,
                json,
            },
        )?,
        Command::Secrets { workflow } => commands::secrets(catalog, &config, &workflow)?,
        Command::Domains { workflow } => commands::domains(catalog, &config, &workflow)?,
    };

    print!("{output}");
    if !output.is_empty() && !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "aw=debug" } else { "aw=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
