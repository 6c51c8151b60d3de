//! HTTP client for the video-hosting service
//!
//! The service exposes `GET {base}/streams/{id}`, answering with the video
//! metadata and the list of available streams:
//!
//! ```json
//! {
//!   "title": "Never Gonna Give You Up",
//!   "duration_secs": 212.0,
//!   "streams": [
//!     { "url": "https://cdn.example/v/1080.mp4", "height": 1080, "format": "mp4", "progressive": true },
//!     { "url": "https://cdn.example/v/720.mp4",  "height": 720,  "format": "mp4", "progressive": true },
//!     { "url": "https://cdn.example/v/audio.m4a", "format": "m4a", "progressive": false }
//!   ]
//! }
//! ```
//!
//! Only progressive streams (audio and video muxed together) are considered;
//! the tallest one not exceeding the configured maximum height wins.

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

/// Default cap on the stream height
pub const DEFAULT_MAX_HEIGHT: u32 = 720;

/// Stream entry as reported by the service
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamOption {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default = "default_progressive")]
    pub progressive: bool,
}

fn default_progressive() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration_secs: Option<f64>,
    #[serde(default)]
    streams: Vec<StreamOption>,
}

/// Video-hosting service client
#[derive(Debug, Clone)]
pub struct VideoServiceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_height: u32,
}

impl VideoServiceClient {
    /// Create a builder for a service rooted at `base_url`
    pub fn builder(base_url: impl Into<String>) -> VideoServiceClientBuilder {
        VideoServiceClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    fn streams_url(&self, source_id: &str, video_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ResolutionError::unavailable(source_id, format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ResolutionError::unavailable(source_id, "base URL cannot have a path"))?
            .pop_if_empty()
            .push("streams")
            .push(video_id);
        Ok(url)
    }
}

#[async_trait]
impl ServiceLookup for VideoServiceClient {
    fn name(&self) -> &str {
        "video"
    }

    async fn lookup(&self, descriptor: &SourceDescriptor) -> Result<ServiceStream> {
        let source_id = descriptor.source_id();
        let video_id = normalize_video_id(descriptor.identifier());
        if video_id.is_empty() {
            return Err(ResolutionError::not_found(&source_id, "empty video identifier"));
        }

        let url = self.streams_url(&source_id, &video_id)?;
        debug!(source = %source_id, video_id = %video_id, "Looking up video streams");

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response: StreamsResponse = get_json(request, &source_id).await?;

        let stream = pick_stream(&response.streams, self.max_height).ok_or_else(|| {
            ResolutionError::not_found(
                &source_id,
                format!("no progressive stream at or below {}p", self.max_height),
            )
        })?;

        info!(
            source = %source_id,
            height = stream.height.unwrap_or(0),
            "Video stream selected"
        );

        Ok(ServiceStream {
            url: stream.url.clone(),
            info: TrackInfo {
                title: response.title,
                duration: response
                    .duration_secs
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .map(Duration::from_secs_f64),
                format: stream.format.clone(),
            },
        })
    }
}

/// Choose the tallest progressive stream not exceeding `max_height`
///
/// Streams without a reported height rank below every sized stream. On equal
/// height the first listed stream wins.
pub fn pick_stream(streams: &[StreamOption], max_height: u32) -> Option<&StreamOption> {
    streams
        .iter()
        .filter(|s| s.progressive)
        .filter(|s| s.height.is_none_or(|h| h <= max_height))
        .rev()
        .max_by_key(|s| s.height.unwrap_or(0))
}

/// Extract the bare video id from the accepted identifier forms
///
/// Accepts a bare id, `...watch?v=ID`, `youtu.be/ID`, `/embed/ID`,
/// `/shorts/ID` and `/live/ID`.
pub fn normalize_video_id(identifier: &str) -> String {
    let identifier = identifier.trim();
    let Ok(url) = Url::parse(identifier) else {
        return identifier.to_string();
    };

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return v.into_owned();
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let is_short_host = url
        .host_str()
        .is_some_and(|h| h == "youtu.be" || h.ends_with(".youtu.be"));
    if is_short_host {
        if let Some(id) = segments.first() {
            return id.to_string();
        }
    }

    match segments.as_slice() {
        ["embed" | "shorts" | "live" | "v", id, ..] => id.to_string(),
        _ => identifier.to_string(),
    }
}

/// Builder for [`VideoServiceClient`]
pub struct VideoServiceClientBuilder {
    client: Option<Client>,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_height: u32,
    user_agent: String,
}

impl VideoServiceClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: None,
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_height: DEFAULT_MAX_HEIGHT,
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

    /// Set the maximum stream height
    pub fn max_height(mut self, max_height: u32) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client
    pub fn build(self) -> Result<VideoServiceClient> {
        let client = match self.client {
            Some(client) => client,
            None => build_http_client(self.timeout, &self.user_agent)?,
        };

        Ok(VideoServiceClient {
            client,
            base_url: normalize_base_url(&self.base_url),
            api_key: self.api_key,
            max_height: self.max_height,
        })
    }
}
