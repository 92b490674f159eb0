mod cmd_run;
mod cmd_serve;
mod cmd_status;
mod cmd_sync;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aspirin_core::AspirinConfig;
use cmd_serve::ServeArgs;

#[derive(Parser)]
#[command(
    name = "git-aspirin",
    version,
    about = "Fetch GitHub commits and mark them resolved from a local report"
)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,
    /// Snapshot file (overrides `store_path` from the config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new commits, then serve the report
    Run {
        #[command(flatten)]
        serve: ServeArgs,
    },
    /// Fetch new commits and update the snapshot
    Sync,
    /// Serve the report from the existing snapshot without contacting GitHub
    Serve {
        #[command(flatten)]
        serve: ServeArgs,
    },
    /// Print review progress for the stored snapshot
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AspirinConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let store_path = cli.store.unwrap_or_else(|| config.store_path.clone());

    match cli.cmd {
        Command::Run { serve } => cmd_run::execute(&config, &store_path, &serve),
        Command::Sync => cmd_sync::execute(&config, &store_path),
        Command::Serve { serve } => cmd_serve::execute(&config, &store_path, &serve),
        Command::Status => cmd_status::execute(&store_path),
    }
}
