//! HTTP client for the audio-streaming service
//!
//! Two calls per lookup:
//!
//! 1. `GET {base}/search?q={query}` returns candidate tracks:
//!    `{"tracks": [{"id": "t1", "title": "...", "duration_secs": 180.0}]}`
//! 2. `GET {base}/tracks/{id}/stream` returns the transfer URL of the first
//!    candidate: `{"url": "https://cdn.example/t1.mp3", "format": "mp3"}`
//!
//! An identifier of the form `track:{id}` skips the search.

use crate::error::{ResolutionError, Result};
use crate::lookup::{
    build_http_client, get_json, normalize_base_url, ServiceLookup, ServiceStream, TrackInfo,
    API_KEY_HEADER, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use async_trait::async_trait;
use pxmcache::SourceDescriptor;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Prefix selecting a track by id instead of searching
pub const TRACK_ID_PREFIX: &str = "track:";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrackSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Vec<TrackSummary>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    url: String,
    #[serde(default)]
    format: Option<String>,
}

/// Audio-streaming service client
#[derive(Debug, Clone)]
pub struct AudioServiceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AudioServiceClient {
    /// Create a builder for a service rooted at `base_url`
    pub fn builder(base_url: impl Into<String>) -> AudioServiceClientBuilder {
        AudioServiceClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, source_id: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ResolutionError::unavailable(source_id, format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ResolutionError::unavailable(source_id, "base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Search the catalogue
    pub async fn search(&self, source_id: &str, query: &str) -> Result<Vec<TrackSummary>> {
        let mut url = self.endpoint(source_id, &["search"])?;
        url.query_pairs_mut().append_pair("q", query);
        debug!(source = source_id, query, "Searching audio service");

        let response: SearchResponse = get_json(self.get(url), source_id).await?;
        Ok(response.tracks)
    }

    async fn stream(&self, source_id: &str, track_id: &str) -> Result<StreamResponse> {
        let url = self.endpoint(source_id, &["tracks", track_id, "stream"])?;
        get_json(self.get(url), source_id).await
    }
}

#[async_trait]
impl ServiceLookup for AudioServiceClient {
    fn name(&self) -> &str {
        "audio"
    }

    async fn lookup(&self, descriptor: &SourceDescriptor) -> Result<ServiceStream> {
        let source_id = descriptor.source_id();
        let identifier = descriptor.identifier().trim();
        if identifier.is_empty() {
            return Err(ResolutionError::not_found(&source_id, "empty query"));
        }

        let summary = match identifier.strip_prefix(TRACK_ID_PREFIX) {
            Some(id) => TrackSummary {
                id: id.to_string(),
                title: None,
                duration_secs: None,
            },
            None => self
                .search(&source_id, identifier)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ResolutionError::not_found(&source_id, "no track matches the query"))?,
        };

        let stream = self.stream(&source_id, &summary.id).await?;
        info!(source = %source_id, track = %summary.id, "Audio track resolved");

        Ok(ServiceStream {
            url: stream.url,
            info: TrackInfo {
                title: summary.title,
                duration: summary
                    .duration_secs
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .map(Duration::from_secs_f64),
                format: stream.format,
            },
        })
    }
}

/// Builder for [`AudioServiceClient`]
pub struct AudioServiceClientBuilder {
    client: Option<Client>,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    user_agent: String,
}

impl AudioServiceClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: None,
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the lookup timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AudioServiceClient> {
        let client = match self.client {
            Some(client) => client,
            None => build_http_client(self.timeout, &self.user_agent)?,
        };

        Ok(AudioServiceClient {
            client,
            base_url: normalize_base_url(&self.base_url),
            api_key: self.api_key,
        })
    }
}
