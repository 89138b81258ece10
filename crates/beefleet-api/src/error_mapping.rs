//! Maps service errors and warp rejections to JSON responses.
//! Every failure body is `{"error": ...}` unless upstream supplied its own.

use std::convert::Infallible;

use beefleet_core::ProxyError;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};
use warp::Rejection;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn json_error(message: impl Into<String>, status: StatusCode) -> Response {
    reply::with_status(
        reply::json(&ErrorBody {
            error: message.into(),
        }),
        status,
    )
    .into_response()
}

/// Upstream HTTP errors keep upstream's status and body; everything else
/// gets the mapped status and a safe message.
pub fn error_reply(err: &ProxyError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);

    if status.is_server_error() {
        tracing::warn!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }

    match err.upstream_body() {
        Some(body) => reply::with_status(reply::json(body), status).into_response(),
        None => json_error(err.user_message(), status),
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else {
        tracing::debug!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Invalid request")
    };

    Ok(json_error(message, status))
}
