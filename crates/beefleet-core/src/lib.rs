pub mod config;
pub mod error;

pub use config::{
    Config, FleetConfig, GeocoderConfig, ServerConfig, UpstreamConfig, ValidationResult,
    MAX_HISTORY_WEEKS,
};
pub use error::{CredentialError, ProxyError, ReqwestErrorExt, NO_API_KEY_MESSAGE};

use anyhow::Result;

/// Initialize logging for the server process
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("BeeFleet core initialized");
    Ok(())
}
