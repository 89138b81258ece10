use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable place for a coordinate.
///
/// Any field may be empty when the geocoder has no structured address for the
/// spot (open sea, remote areas).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub city: String,
    pub state: String,
    /// ISO 3166-1 alpha-2, uppercase
    pub country: String,
}

/// Cache key: latitude/longitude truncated to 3 decimals (~100m grid).
///
/// Stored as whole millidegrees so equality is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    lat_milli: i64,
    lon_milli: i64,
}

impl CoordinateKey {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat_milli: truncate_milli(lat),
            lon_milli: truncate_milli(lon),
        }
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3},{:.3}",
            self.lat_milli as f64 / 1000.0,
            self.lon_milli as f64 / 1000.0
        )
    }
}

/// Drop everything past the third decimal, toward zero.
fn truncate_milli(value: f64) -> i64 {
    let scaled = value * 1000.0;
    // Absorb a few ulps of representation error (1.001 * 1000 == 1000.9999999999999)
    // without pulling genuine values across a cell edge.
    let tolerance = scaled.abs() * f64::EPSILON * 4.0;
    (scaled + scaled.signum() * tolerance).trunc() as i64
}

/// Reverse geocoding errors. These never reach an HTTP client; a failed
/// lookup just leaves the location un-enriched.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Geocoder returned status {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}
