//! Centralized error types for the BeeFleet proxy.
//!
//! This module provides the error taxonomy shared by every crate that
//! talks to the Bee Maps API:
//! - Caller mistakes (missing parameters, blank credentials)
//! - A missing credential
//! - Upstream failures, split by whether upstream answered at all
//!
//! Every variant knows the HTTP status it maps to and the message a client
//! is allowed to see. Internal detail stays in the `Display` output, which is
//! only ever logged.

use thiserror::Error;

/// Client-facing message when no credential is configured.
pub const NO_API_KEY_MESSAGE: &str = "API key not configured. Go to Settings to add it.";

/// Errors produced while relaying a call to the upstream telematics API.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Bad caller input (missing query parameter, blank key).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No credential is configured; the network was not touched.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Upstream answered with a failure status. The body is relayed verbatim.
    #[error("Upstream HTTP error: {status}")]
    UpstreamHttp {
        status: u16,
        body: serde_json::Value,
    },

    /// Upstream answered, but not with JSON (usually an HTML error page).
    #[error("Upstream protocol error: status {status}, content-type {content_type:?}")]
    UpstreamProtocol { status: u16, content_type: String },

    /// DNS, connect, timeout or any other transport-level failure.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Local persistence failed (settings file could not be written).
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ProxyError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::InvalidInput(_) => 400,
            ProxyError::Unauthorized(_) => 401,
            ProxyError::UpstreamHttp { status, .. } => *status,
            ProxyError::UpstreamProtocol { .. } | ProxyError::UpstreamUnreachable(_) => 502,
            ProxyError::Storage(_) => 500,
        }
    }

    /// Message safe to put in a response body.
    pub fn user_message(&self) -> String {
        match self {
            ProxyError::InvalidInput(msg) | ProxyError::Unauthorized(msg) => msg.clone(),
            ProxyError::UpstreamHttp { status, .. } => {
                format!("Bee Maps API request failed with status {}", status)
            }
            ProxyError::UpstreamProtocol { .. } => {
                "Bee Maps API returned an unexpected response".to_string()
            }
            ProxyError::UpstreamUnreachable(_) => "Failed to reach Bee Maps API".to_string(),
            ProxyError::Storage(_) => "Failed to save settings. Please try again.".to_string(),
        }
    }

    /// Upstream's own error body, when upstream produced one.
    pub fn upstream_body(&self) -> Option<&serde_json::Value> {
        match self {
            ProxyError::UpstreamHttp { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Shorthand for the "no credential configured" case.
    pub fn no_api_key() -> Self {
        ProxyError::Unauthorized(NO_API_KEY_MESSAGE.to_string())
    }
}

/// Credential store errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid credential: {0}")]
    InvalidInput(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl From<CredentialError> for ProxyError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::InvalidInput(msg) => ProxyError::InvalidInput(msg),
            CredentialError::Storage(msg) => ProxyError::Storage(msg),
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_proxy_error(self) -> ProxyError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_proxy_error(self) -> ProxyError {
        if self.is_timeout() {
            ProxyError::UpstreamUnreachable(format!("request timed out: {}", self))
        } else if self.is_connect() {
            ProxyError::UpstreamUnreachable(format!("connection failed: {}", self))
        } else {
            ProxyError::UpstreamUnreachable(self.to_string())
        }
    }
}
