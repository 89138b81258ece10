//! # HTTP surface
//!
//! | Method | Path                      | Description                              |
//! |--------|---------------------------|------------------------------------------|
//! | GET    | `/api/settings`           | Whether a key is set, plus a masked hint |
//! | POST   | `/api/settings`           | Save the Bee Maps API key                |
//! | GET    | `/api/devices`            | Upstream device list                     |
//! | GET    | `/api/location`           | Device location with city/state/country  |
//! | GET    | `/api/rewards`            | Weekly rewards for `rewardPeriod`        |
//! | GET    | `/api/fleet`              | Devices joined with rewards and places   |
//! | GET    | `/api/fleet/{id}/rewards` | One device's rewards for recent `weeks`  |
//! | GET    | `/api/health`             | Liveness and geocode cache counters      |

use std::collections::HashMap;
use std::convert::Infallible;

use warp::{Filter, Rejection, Reply};

use crate::error_mapping::handle_rejection;
use crate::handlers;
use crate::state::AppState;

const MAX_SETTINGS_BODY: u64 = 16 * 1024;

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn query_map() -> impl Filter<Extract = (HashMap<String, String>,), Error = Rejection> + Clone {
    warp::query::<HashMap<String, String>>()
}

/// All API routes with CORS, request tracing and JSON error replies.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(handlers::health);

    let get_settings = warp::path!("api" / "settings")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(handlers::get_settings);

    let save_settings = warp::path!("api" / "settings")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_SETTINGS_BODY))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .map(handlers::save_settings);

    let devices = warp::path!("api" / "devices")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_devices);

    let location = warp::path!("api" / "location")
        .and(warp::get())
        .and(query_map())
        .and(with_state(state.clone()))
        .and_then(handlers::get_location);

    let rewards = warp::path!("api" / "rewards")
        .and(warp::get())
        .and(query_map())
        .and(with_state(state.clone()))
        .and_then(handlers::get_rewards);

    let fleet = warp::path!("api" / "fleet")
        .and(warp::get())
        .and(query_map())
        .and(with_state(state.clone()))
        .and_then(handlers::fleet_overview);

    let reward_history = warp::path!("api" / "fleet" / String / "rewards")
        .and(warp::get())
        .and(query_map())
        .and(with_state(state))
        .and_then(handlers::reward_history);

    health
        .or(get_settings)
        .or(save_settings)
        .or(devices)
        .or(location)
        .or(rewards)
        .or(fleet)
        .or(reward_history)
        .with(cors)
        .recover(handle_rejection)
        .with(warp::trace::request())
}
