//! Process-lifetime memo of reverse geocoding results.

use crate::geocode::ReverseGeocoder;
use crate::types::{CoordinateKey, Place};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for diagnostics, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
}

/// Coordinate -> place cache in front of a [`ReverseGeocoder`].
///
/// Entries never expire. Only successful lookups are stored, so a transient
/// geocoder failure is retried on the next request for the same cell.
/// Concurrent misses on one cell may both hit the geocoder; the second write
/// replaces an identical value.
#[derive(Debug)]
pub struct GeocodeCache {
    geocoder: ReverseGeocoder,
    entries: RwLock<HashMap<CoordinateKey, Place>>,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl GeocodeCache {
    pub fn new(geocoder: ReverseGeocoder) -> Self {
        Self {
            geocoder,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Resolve a coordinate to a place, or `None` if the geocoder failed.
    pub async fn resolve(&self, lat: f64, lon: f64) -> Option<Place> {
        let key = CoordinateKey::new(lat, lon);

        if let Some(place) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(place);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // The read lock is released before awaiting the lookup.
        match self.geocoder.lookup(lat, lon).await {
            Ok(place) => {
                tracing::debug!("Geocoded {} to {:?}", key, place);
                self.entries.write().insert(key, place.clone());
                Some(place)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Reverse geocode failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Cached place for a key, without touching the geocoder.
    pub fn get(&self, key: &CoordinateKey) -> Option<Place> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beefleet_core::GeocoderConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn queens() -> serde_json::Value {
        serde_json::json!({
            "address": {"city": "Queens", "state": "New York", "country_code": "us"}
        })
    }

    fn cache_for(server: &MockServer, timeout_secs: u64) -> GeocodeCache {
        let geocoder = ReverseGeocoder::new(&GeocoderConfig {
            url: format!("{}/reverse", server.uri()),
            user_agent: "BeeFleetTest/1.0".to_string(),
            timeout_secs,
            zoom: 10,
        })
        .unwrap();
        GeocodeCache::new(geocoder)
    }

    #[tokio::test]
    async fn test_one_upstream_call_per_grid_cell() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(queens()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, 5);
        for (lat, lon) in [(40.0001, -73.0002), (40.0005, -73.0009), (40.0009, -73.0001)] {
            let place = cache.resolve(lat, lon).await.unwrap();
            assert_eq!(place.city, "Queens");
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 2,
                misses: 1,
                failures: 0
            }
        );
    }

    #[tokio::test]
    async fn test_distinct_cells_each_call_upstream() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(queens()))
            .expect(2)
            .mount(&server)
            .await;

        let cache = cache_for(&server, 5);
        cache.resolve(40.0001, -73.0002).await.unwrap();
        cache.resolve(40.0011, -73.0002).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(queens()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, 5);
        assert!(cache.resolve(40.0001, -73.0002).await.is_none());
        assert!(cache.is_empty());

        let place = cache.resolve(40.0001, -73.0002).await.unwrap();
        assert_eq!(place.country, "US");
        assert_eq!(cache.get(&CoordinateKey::new(40.0001, -73.0002)), Some(place));
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_timeout_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(queens())
                    .set_delay(Duration::from_secs(3)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(queens()))
            .mount(&server)
            .await;

        let cache = cache_for(&server, 1);
        assert!(cache.resolve(51.5, -0.12).await.is_none());
        assert!(cache.resolve(51.5, -0.12).await.is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_geocoder_returns_none() {
        let server = MockServer::start().await;
        let cache = cache_for(&server, 1);
        drop(server);

        assert!(cache.resolve(10.0, 10.0).await.is_none());
        assert!(cache.is_empty());
    }
}
