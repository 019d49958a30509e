use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use huddle_infrastructure::ConfigService;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Huddle CLI - real-time channel synchronization core", long_about = None)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a scripted sync scenario against the in-memory backend
    Simulate {
        /// Number of history messages seeded into #general
        #[arg(long, default_value_t = 25)]
        messages: usize,
        /// Print each step as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let service = match &cli.config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new().context("Failed to resolve config location")?,
    };

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&service)?,
            ConfigAction::Path => commands::config::path(&service),
        },
        Commands::Simulate { messages, json } => {
            let config = service.get_config().context("Failed to load config")?;
            huddle_telemetry::init_tracing(&config.logging, None)?;
            commands::simulate::run(&config, messages, json).await?;
        }
        Commands::Version => commands::version::show(),
    }

    Ok(())
}
