//! Stagewise CLI - Main Entry Point
//!
//! Inspects pipelines on the remote platform and tests them one stage at a
//! time, through the API or through the UI.

use clap::{Parser, Subcommand};
use stagewise_common::HarnessConfig;
use std::path::PathBuf;

mod commands;
mod output;

use commands::{generate, pipeline, scenario};

/// Stage-by-stage pipeline test harness
#[derive(Parser)]
#[command(name = "stagewise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(short, long, default_value = "stagewise.toml", env = "STAGEWISE_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a pipeline definition
    Pipeline {
        /// Pipeline ID
        id: String,
    },

    /// List a pipeline's stages in execution order
    Stages {
        /// Pipeline ID
        id: String,
    },

    /// Run a pipeline stage by stage
    Run(pipeline::RunArgs),

    /// Run the YAML scenario suite
    Scenarios(scenario::ScenarioArgs),

    /// Write mock input records to a file
    Generate(generate::GenerateArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let passed = match cli.command {
        Commands::Generate(args) => {
            generate::execute(args)?;
            true
        }
        Commands::Version => {
            println!("Stagewise CLI v{}", env!("CARGO_PKG_VERSION"));
            true
        }
        command => {
            let config = HarnessConfig::from_file_and_env(&cli.config)?;
            tracing::debug!("Using {} environment at {}", config.environment, config.base_url());
            match command {
                Commands::Pipeline { id } => {
                    pipeline::show(&config, &id, cli.format).await?;
                    true
                }
                Commands::Stages { id } => {
                    pipeline::stages(&config, &id, cli.format).await?;
                    true
                }
                Commands::Run(args) => {
                    pipeline::check_args(&args)?;
                    pipeline::run(&config, args, cli.format).await?
                }
                Commands::Scenarios(args) => scenario::execute(&config, args, cli.format).await?,
                Commands::Generate(_) | Commands::Version => true,
            }
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
