//! tomation - run UI test scripts against a document.
//!
//! Commands:
//! - `list`: List the tests defined under `.tomation/tests`
//! - `compile <id>`: Print the compiled action tree of a test as JSON
//! - `bridge --document FIXTURE`: Serve a controller over stdin/stdout

mod bridge;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tm_core::config::loader::load_config;
use tm_core::config::models::AppConfig;
use tm_core::error::RunError;
use tm_core::script::compile_scripts;
use tracing_subscriber::EnvFilter;

use crate::bridge::Bridge;

#[derive(Parser)]
#[command(name = "tomation")]
#[command(about = "UI test automation engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root containing the `.tomation/` directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log at debug level regardless of `config.toml`
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tests of the project
    List,

    /// Print the compiled action tree of a test
    Compile {
        /// Test id
        id: String,
    },

    /// Exchange commands and events as JSON lines over stdin/stdout
    Bridge {
        /// JSON fixture describing the document under test
        #[arg(long)]
        document: PathBuf,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    run(cli).await.map_err(|e| color_eyre::eyre::eyre!(e))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.root).await?;
    init_tracing(cli.verbose || config.global.debug);

    match cli.command {
        Commands::List => list(&config),
        Commands::Compile { id } => compile(&config, &id),
        Commands::Bridge { document } => bridge(&cli.root, config, &document).await,
    }
}

/// Logs go to stderr: stdout belongs to the bridge protocol.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn list(config: &AppConfig) -> Result<()> {
    if config.tests.is_empty() {
        println!("{}", "No tests found in .tomation/tests".yellow());
        return Ok(());
    }

    for task in compile_scripts(&config.tests)? {
        let tree = task.compile(Value::Null);
        println!(
            "{}  {}",
            task.id().green().bold(),
            format!("{} steps", tree.steps().len()).dimmed()
        );
    }
    Ok(())
}

fn compile(config: &AppConfig, id: &str) -> Result<()> {
    let task = compile_scripts(&config.tests)?
        .into_iter()
        .find(|task| task.id() == id)
        .ok_or_else(|| RunError::TaskNotRegistered(id.to_string()))?;

    let summary = task.compile(Value::Null).summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn bridge(root: &Path, config: AppConfig, document: &Path) -> Result<()> {
    let bridge = Bridge::open(root, config, document)?;
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    bridge.serve(input, &mut output).await
}
