use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use beefleet_core::ProxyError;
use beefleet_geocode::CacheStats;
use serde::Serialize;
use serde_json::Value;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{self, Reply, Response};

use crate::error_mapping::{error_reply, json_error};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    has_api_key: bool,
    api_key_hint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    geocode_cache: GeocodeCacheReport,
}

#[derive(Debug, Serialize)]
struct GeocodeCacheReport {
    entries: usize,
    #[serde(flatten)]
    stats: CacheStats,
}

fn relay(result: Result<Value, ProxyError>) -> Response {
    match result {
        Ok(body) => reply::json(&body).into_response(),
        Err(e) => error_reply(&e),
    }
}

/// Liveness plus geocode cache counters.
pub fn health(state: AppState) -> Response {
    reply::json(&HealthResponse {
        status: "ok",
        geocode_cache: GeocodeCacheReport {
            entries: state.geocode_cache.len(),
            stats: state.geocode_cache.stats(),
        },
    })
    .into_response()
}

pub fn get_settings(state: AppState) -> Response {
    reply::json(&SettingsResponse {
        has_api_key: state.credentials.has_key(),
        api_key_hint: state.credentials.hint(),
    })
    .into_response()
}

/// Body must be a JSON object with a non-blank string `apiKey`.
pub fn save_settings(body: Bytes, state: AppState) -> Response {
    let api_key = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("apiKey").and_then(Value::as_str).map(String::from));

    let Some(api_key) = api_key else {
        return json_error("apiKey is required", StatusCode::BAD_REQUEST);
    };

    match state.credentials.set(&api_key) {
        Ok(()) => reply::json(&serde_json::json!({"ok": true})).into_response(),
        Err(e) => error_reply(&ProxyError::from(e)),
    }
}

pub async fn list_devices(state: AppState) -> Result<Response, Infallible> {
    Ok(relay(state.fleet.list_devices().await))
}

pub async fn get_location(
    query: HashMap<String, String>,
    state: AppState,
) -> Result<Response, Infallible> {
    let device_id = query.get("deviceId").map(String::as_str);
    Ok(relay(state.fleet.get_location(device_id).await))
}

pub async fn get_rewards(
    query: HashMap<String, String>,
    state: AppState,
) -> Result<Response, Infallible> {
    let reward_period = query.get("rewardPeriod").map(String::as_str);
    Ok(relay(state.fleet.get_rewards(reward_period).await))
}

/// Weekly rewards for one device, newest week first.
pub async fn reward_history(
    device_id: String,
    query: HashMap<String, String>,
    state: AppState,
) -> Result<Response, Infallible> {
    let weeks = query.get("weeks").map(String::as_str);

    let response = match state.fleet.reward_history(&device_id, weeks).await {
        Ok(history) => reply::json(&history).into_response(),
        Err(e) => error_reply(&e),
    };

    Ok(response)
}

/// Runs on its own task so a client disconnect doesn't abort lookups in flight.
pub async fn fleet_overview(
    query: HashMap<String, String>,
    state: AppState,
) -> Result<Response, Infallible> {
    let reward_period = query.get("rewardPeriod").cloned();
    let fleet = Arc::clone(&state.fleet);

    let response = match tokio::spawn(async move { fleet.overview(reward_period).await }).await {
        Ok(Ok(overview)) => reply::json(&overview).into_response(),
        Ok(Err(e)) => error_reply(&e),
        Err(e) => {
            tracing::error!("Fleet overview task failed: {}", e);
            json_error("Internal server error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    Ok(response)
}
