use std::net::SocketAddr;

use anyhow::{Context, Result};
use beefleet_api::AppState;
use beefleet_auth::CredentialStore;
use beefleet_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    beefleet_core::init()?;

    let (config, _validation) = Config::load_validated()?;

    let credentials = CredentialStore::from_env(config.settings_path());
    if !credentials.has_key() {
        tracing::warn!("No API key configured yet. Add one via the Settings page.");
    }

    let state = AppState::new(&config, credentials)?;

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr()))?;

    tracing::info!("Forwarding to {}", config.upstream.base_url);

    beefleet_api::serve(state, addr, shutdown_signal()).await?;

    tracing::info!("BeeFleet server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
