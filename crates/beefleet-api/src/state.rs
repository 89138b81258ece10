//! Shared services handed to every request handler.

use std::sync::Arc;

use anyhow::{Context, Result};
use beefleet_auth::CredentialStore;
use beefleet_core::Config;
use beefleet_geocode::{GeocodeCache, ReverseGeocoder};
use beefleet_services::{FleetService, LocationService, UpstreamProxy};

/// Cheap to clone; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub geocode_cache: Arc<GeocodeCache>,
    pub fleet: Arc<FleetService>,
}

impl AppState {
    /// Wire up the proxy, geocode cache and fleet services from `config`.
    ///
    /// The geocode cache is created here and lives as long as the state does.
    pub fn new(config: &Config, credentials: CredentialStore) -> Result<Self> {
        let credentials = Arc::new(credentials);

        let proxy = Arc::new(
            UpstreamProxy::new(&config.upstream, Arc::clone(&credentials))
                .context("Failed to create upstream HTTP client")?,
        );

        let geocoder =
            ReverseGeocoder::new(&config.geocoder).context("Failed to create geocoding client")?;
        let geocode_cache = Arc::new(GeocodeCache::new(geocoder));

        let locations = Arc::new(LocationService::new(
            Arc::clone(&proxy),
            Arc::clone(&geocode_cache),
        ));
        let fleet = Arc::new(FleetService::new(proxy, locations, config.fleet.clone()));

        Ok(Self {
            credentials,
            geocode_cache,
            fleet,
        })
    }
}
