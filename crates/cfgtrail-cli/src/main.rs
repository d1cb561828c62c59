use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cfgtrail_core::TrailConfig;
use cfgtrail_core::config::CONFIG_PATH_ENV;

mod commands;

use commands::process::ProcessOptions;

#[derive(Parser, Debug)]
#[command(name = "cfgtrail", version, about = "Audit trail producer for configuration change streams")]
struct Cli {
    /// YAML configuration file. Environment variables override its values.
    #[arg(long, global = true, env = "CFGTRAIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route one stream batch (JSON) into the audit store.
    Process {
        /// Batch file. Reads stdin when omitted or "-".
        file: Option<PathBuf>,

        /// Keep records in memory instead of writing the audit table
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Skip failing events instead of failing the whole batch
        #[arg(long, default_value_t = false)]
        isolate: bool,
    },

    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.cmd {
        Command::Process {
            file,
            dry_run,
            isolate,
        } => {
            commands::process::run_process(
                config,
                ProcessOptions {
                    input: file.as_deref(),
                    dry_run,
                    isolate,
                },
            )
            .await?;
        }
        Command::Config => commands::config::run_config(&config)?,
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<TrailConfig> {
    // --config wins over the variable it defaults from.
    let config_file = path.map(|p| p.display().to_string());
    let config = TrailConfig::load_from(|name| match (name, &config_file) {
        (CONFIG_PATH_ENV, Some(file)) => Some(file.clone()),
        _ => std::env::var(name).ok(),
    })
    .with_context(|| match &config_file {
        Some(file) => format!("Failed to load configuration from {}", file),
        None => "Invalid configuration".to_string(),
    })?;

    tracing::debug!(
        backend = %config.store.backend,
        region = %config.store.region,
        table = %config.store.table,
        policy = %config.pipeline.failure_policy,
        "Configuration loaded"
    );
    Ok(config)
}
