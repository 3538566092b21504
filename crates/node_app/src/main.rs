use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use node_app::config::{load_config, Mode, CONFIG_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(&PathBuf::from(CONFIG_FILE))?;

    tracing::info!("meshjoin starting...");
    tracing::info!("mode       = {:?}", config.mode);
    tracing::info!("moniker    = {}", config.moniker);
    tracing::info!("app_id     = {}", config.app_id);
    tracing::info!("data_dir   = {:?}", config.data_dir);

    match config.mode {
        Mode::Host => {
            let host = node_app::start_host(&config).await?;
            tracing::info!(
                "group uid  = {} (peers at http://{}/peers)",
                host.group.uid,
                host.addr
            );
            tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
            tracing::info!("shutting down");
            host.stop().await?;
        }
        Mode::Join => {
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("create {}", config.data_dir.display()))?;
            let dir = tokio::select! {
                dir = node_app::run_join(&config) => dir?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("join abandoned");
                    return Ok(());
                }
            };
            tracing::info!("engine configuration written to {}", dir.display());
        }
    }

    Ok(())
}
