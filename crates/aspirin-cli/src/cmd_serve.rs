use std::path::Path;
use std::sync::Arc;

use aspirin_core::AspirinConfig;
use aspirin_serve::{AppState, ServeConfig};
use aspirin_store::{StoreLock, YamlFileStore};
use clap::Args;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

/// `git-aspirin serve`
pub fn execute(config: &AspirinConfig, store_path: &Path, args: &ServeArgs) -> anyhow::Result<()> {
    let _lock = StoreLock::acquire(store_path)?;
    serve(config, store_path, args)
}

/// Start the report server and block until it stops. The caller holds the store lock.
pub fn serve(config: &AspirinConfig, store_path: &Path, args: &ServeArgs) -> anyhow::Result<()> {
    let state = AppState::new(
        Arc::new(YamlFileStore::new(store_path)),
        config.repo_slug(),
    )?
    .with_exclude_folders(config.exclude_folders.clone())
    .with_static_dir(&config.static_dir);
    let serve_config = ServeConfig {
        bind: args.bind.clone(),
        port: args.port,
    };
    tokio::runtime::Runtime::new()?.block_on(aspirin_serve::serve(state, serve_config))
}
