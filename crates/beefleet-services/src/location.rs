//! Device location lookup with reverse-geocoded place names.

use std::sync::Arc;

use beefleet_core::ProxyError;
use beefleet_geocode::{GeocodeCache, Place};
use serde_json::Value;

use crate::proxy::UpstreamProxy;

pub struct LocationService {
    proxy: Arc<UpstreamProxy>,
    geocoder: Arc<GeocodeCache>,
}

impl LocationService {
    pub fn new(proxy: Arc<UpstreamProxy>, geocoder: Arc<GeocodeCache>) -> Self {
        Self { proxy, geocoder }
    }

    /// Fetch a device's location and add `city`, `state` and `country` to it.
    ///
    /// A geocoding failure is not an error: the upstream response is returned
    /// without the place fields.
    pub async fn get_enriched_location(&self, device_id: Option<&str>) -> Result<Value, ProxyError> {
        let device_id = device_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProxyError::InvalidInput("deviceId query param required".to_string()))?;

        let mut data = self
            .proxy
            .forward("/location", &[("deviceId", device_id)])
            .await?;

        if let Some((lat, lon)) = coordinates(&data) {
            match self.geocoder.resolve(lat, lon).await {
                Some(place) => merge_place(&mut data, &place),
                None => tracing::debug!("No place for device {} at {},{}", device_id, lat, lon),
            }
        }

        Ok(data)
    }
}

fn coordinates(data: &Value) -> Option<(f64, f64)> {
    let lat = data.get("lat")?.as_f64()?;
    let lon = data.get("lon")?.as_f64()?;
    Some((lat, lon))
}

/// Overwrites any same-named fields already present.
fn merge_place(data: &mut Value, place: &Place) {
    if let Some(obj) = data.as_object_mut() {
        obj.insert("city".to_string(), Value::String(place.city.clone()));
        obj.insert("state".to_string(), Value::String(place.state.clone()));
        obj.insert("country".to_string(), Value::String(place.country.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinates_require_both() {
        assert_eq!(coordinates(&json!({"lat": 1.5, "lon": -2.0})), Some((1.5, -2.0)));
        assert_eq!(coordinates(&json!({"lat": 1.5})), None);
        assert_eq!(coordinates(&json!({"lat": null, "lon": 2.0})), None);
        assert_eq!(coordinates(&json!([1, 2])), None);
    }

    #[test]
    fn test_merge_place_overwrites() {
        let mut data = json!({"lat": 1.0, "lon": 2.0, "city": "stale", "timestamp": 1700000000});
        let place = Place {
            city: "Queens".into(),
            state: "New York".into(),
            country: "US".into(),
        };
        merge_place(&mut data, &place);
        assert_eq!(data["city"], "Queens");
        assert_eq!(data["state"], "New York");
        assert_eq!(data["country"], "US");
        assert_eq!(data["timestamp"], 1700000000);
    }
}
