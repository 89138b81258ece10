//! Reverse geocoding for BeeFleet
//!
//! Turns device coordinates into city/state/country via Nominatim and keeps
//! the answers for the lifetime of the process, keyed on a ~100m grid.

pub mod cache;
pub mod geocode;
pub mod types;

pub use cache::{CacheStats, GeocodeCache};
pub use geocode::ReverseGeocoder;
pub use types::{CoordinateKey, GeocodeError, Place};
