//! Reverse geocoding: convert coordinates to city/state/country.
//! Uses Nominatim (OpenStreetMap) - free, no API key required, but a
//! User-Agent is mandatory under its usage policy.

use crate::types::{GeocodeError, Place};
use beefleet_core::GeocoderConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country_code: Option<String>,
}

impl NominatimAddress {
    fn into_place(self) -> Place {
        // Prefer city > town > village > county for the place name
        let city = [self.city, self.town, self.village, self.county]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        Place {
            city,
            state: self.state.unwrap_or_default(),
            country: self
                .country_code
                .map(|c| c.to_uppercase())
                .unwrap_or_default(),
        }
    }
}

/// Nominatim reverse lookup client. One request per call, no caching here.
#[derive(Debug, Clone)]
pub struct ReverseGeocoder {
    client: Client,
    url: String,
    zoom: u8,
}

impl ReverseGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            zoom: config.zoom,
        })
    }

    /// Look up the raw (untruncated) coordinates.
    pub async fn lookup(&self, lat: f64, lon: f64) -> Result<Place, GeocodeError> {
        let zoom = self.zoom.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("format", "json".to_string()),
                ("zoom", zoom),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        Ok(body.address.unwrap_or_default().into_place())
    }
}
