//! Service lookup abstraction
//!
//! A service turns an identifier (video id, search query...) into a direct
//! transfer URL plus some metadata. The resolver then downloads that URL
//! through the cache.

use crate::error::{ResolutionError, Result};
use async_trait::async_trait;
use pxmcache::SourceDescriptor;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default timeout for service lookups (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "PixMedia/0.1 (pxmsource)";

/// Header carrying the optional API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Metadata reported by a service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub duration: Option<Duration>,
    /// Container or codec name as reported (`mp4`, `mp3`, `webm`...)
    pub format: Option<String>,
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStream {
    /// Direct transfer URL
    pub url: String,
    pub info: TrackInfo,
}

/// Lookup of a service identifier
#[async_trait]
pub trait ServiceLookup: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Resolve the descriptor's identifier to a transfer URL
    async fn lookup(&self, descriptor: &SourceDescriptor) -> Result<ServiceStream>;
}

/// Build the reqwest client shared by the service clients
pub(crate) fn build_http_client(timeout: Duration, user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| ResolutionError::unavailable("http-client", e.to_string()))
}

/// Send a GET request and decode its JSON body, mapping failures to the
/// resolution taxonomy
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    source_id: &str,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| ResolutionError::from_reqwest(source_id, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(source = source_id, status = status.as_u16(), "Service returned an error");
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        return Err(ResolutionError::from_status_code(
            source_id,
            status.as_u16(),
            message,
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ResolutionError::from_reqwest(source_id, &e))
}

/// Trim a base URL so that paths can be appended with `/`
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
