//! Command-line driver for Quill
//!
//! Runs the optimistic sync engine against an in-process echo backend and
//! prints every cache change as JSON lines on stdout. Logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod demo;

use commands::chat::ChatArgs;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill - optimistic sync engine driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "quill.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one message and stream the echoed reply
    Chat(ChatArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Chat(args) => commands::chat::run(&config, args).await?,
        Commands::Config => commands::config::run(&config)?,
    }

    Ok(())
}
