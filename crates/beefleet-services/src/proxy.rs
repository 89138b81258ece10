//! Forward-and-relay client for the Bee Maps API.
//!
//! Every telematics call goes through [`UpstreamProxy::forward`], which
//! injects the stored credential and folds whatever happens upstream into a
//! [`ProxyError`].

use std::sync::Arc;
use std::time::Duration;

use beefleet_auth::CredentialStore;
use beefleet_core::{ProxyError, ReqwestErrorExt, UpstreamConfig};
use reqwest::{header, Client};
use serde_json::Value;
use url::Url;

use crate::retry::{with_retry, RetryConfig};

/// Bee Maps API proxy
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    retry: RetryConfig,
}

impl UpstreamProxy {
    pub fn new(
        config: &UpstreamConfig,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            retry: RetryConfig::from(config),
        })
    }

    /// GET `base_url + path` with `query`, returning upstream's JSON body.
    ///
    /// # Errors
    /// - `Unauthorized` when no credential is configured (no request is made)
    /// - `UpstreamProtocol` when the response isn't JSON
    /// - `UpstreamHttp` when upstream answered with a non-2xx status
    /// - `UpstreamUnreachable` on transport failures
    pub async fn forward(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ProxyError> {
        let api_key = self.credentials.get();
        if api_key.is_empty() {
            return Err(ProxyError::no_api_key());
        }

        let url = self.endpoint(path, query)?;

        let response = with_retry(&self.retry, || {
            self.client
                .get(url.clone())
                .bearer_auth(&api_key)
                .send()
        })
        .await
        .map_err(|e| {
            tracing::error!("Proxy error for {}: {}", url, e);
            e.into_proxy_error()
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !is_json(&content_type) {
            tracing::error!(
                "Non-JSON response from {}: {} {}",
                url,
                status.as_u16(),
                content_type
            );
            return Err(ProxyError::UpstreamProtocol {
                status: status.as_u16(),
                content_type,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                tracing::error!("Malformed JSON from {}: {}", url, e);
                ProxyError::UpstreamProtocol {
                    status: status.as_u16(),
                    content_type: content_type.clone(),
                }
            } else {
                tracing::error!("Failed reading body from {}: {}", url, e);
                e.into_proxy_error()
            }
        })?;

        if !status.is_success() {
            tracing::warn!("Upstream {} returned {}", url, status.as_u16());
            return Err(ProxyError::UpstreamHttp {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ProxyError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| {
            tracing::error!("Invalid upstream URL {}: {}", raw, e);
            ProxyError::UpstreamUnreachable(format!("invalid upstream URL {}: {}", raw, e))
        })?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }
}

fn is_json(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("application/json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn proxy_with(base_url: &str, dir: &TempDir) -> UpstreamProxy {
        let store = CredentialStore::new(dir.path().join("settings.json"), Some("key".into()));
        let config = UpstreamConfig {
            base_url: base_url.to_string(),
            ..UpstreamConfig::default()
        };
        UpstreamProxy::new(&config, Arc::new(store)).unwrap()
    }

    #[test]
    fn test_is_json() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON"));
        assert!(!is_json("text/html"));
        assert!(!is_json(""));
    }

    #[test]
    fn test_endpoint_joins_and_encodes() {
        let dir = TempDir::new().unwrap();
        let proxy = proxy_with("https://api.example.com/v1/", &dir);

        let url = proxy.endpoint("/devices", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/devices");

        let url = proxy
            .endpoint("/location", &[("deviceId", "a b&c")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/location?deviceId=a+b%26c"
        );
    }
}
