//! Source resolution
//!
//! [`SourceResolver`] turns any [`SourceDescriptor`] into a local file held
//! in the content cache:
//!
//! - `Url`: fetched through the cache under the descriptor's own key
//! - `VideoService` / `AudioService`: looked up through the matching
//!   [`ServiceLookup`], then the transfer URL is fetched through the cache.
//!   The entry is keyed by that URL, so different queries reaching the same
//!   asset share one entry.
//! - archives (by extension or by content) are unpacked through
//!   [`ContentCache::resolve_bundle`] and their primary media file is
//!   returned.

use crate::error::{ResolutionError, Result};
use crate::lookup::{ServiceLookup, TrackInfo, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::media::{select_bundle_media, MediaKind, StreamDescriptor};
use pxmcache::{extension_from_url, CacheHandle, ContentCache, SourceDescriptor, SourceKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// A resolved source, ready to be decoded
///
/// The cache entry stays pinned as long as `handle` is alive.
#[derive(Debug)]
pub struct ResolvedSource {
    pub stream: StreamDescriptor,
    /// `None` when the source was served from a resolved hint
    pub handle: Option<CacheHandle>,
    /// Metadata reported by a service lookup
    pub info: Option<TrackInfo>,
}

/// Resolves descriptors into cached local files
#[derive(Clone)]
pub struct SourceResolver {
    cache: ContentCache,
    video: Option<Arc<dyn ServiceLookup>>,
    audio: Option<Arc<dyn ServiceLookup>>,
    lookup_timeout: Duration,
}

impl SourceResolver {
    /// Create a resolver for plain URLs only
    pub fn new(cache: ContentCache) -> Self {
        Self {
            cache,
            video: None,
            audio: None,
            lookup_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Attach the video-hosting service
    pub fn with_video_service(mut self, service: Arc<dyn ServiceLookup>) -> Self {
        self.video = Some(service);
        self
    }

    /// Attach the audio-streaming service
    pub fn with_audio_service(mut self, service: Arc<dyn ServiceLookup>) -> Self {
        self.audio = Some(service);
        self
    }

    /// Upper bound on a whole service lookup, whatever the client does
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Resolve a descriptor into a local stream
    pub async fn resolve(&self, descriptor: &SourceDescriptor) -> Result<ResolvedSource> {
        if let Some(hint) = descriptor.resolved_hint() {
            if hint.is_file() {
                debug!(source = %descriptor, path = %hint.display(), "Using resolved hint");
                let media_kind = MediaKind::sniff(hint, default_kind(descriptor.kind()));
                return Ok(ResolvedSource {
                    stream: StreamDescriptor::new(hint, media_kind),
                    handle: None,
                    info: None,
                });
            }
            debug!(source = %descriptor, "Resolved hint is stale, resolving again");
        }

        let resolved = match descriptor.kind() {
            SourceKind::Url => {
                let target = SourceDescriptor::url(descriptor.identifier());
                self.fetch(&target, MediaKind::Image, None).await?
            }
            SourceKind::VideoService | SourceKind::AudioService => {
                let service = self.service_for(descriptor)?;
                let stream = match tokio::time::timeout(
                    self.lookup_timeout,
                    service.lookup(descriptor),
                )
                .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(ResolutionError::Timeout {
                            source_id: descriptor.source_id(),
                        })
                    }
                };
                debug!(source = %descriptor, url = %stream.url, "Service lookup complete");
                check_transfer_url(descriptor, &stream.url)?;

                let target = SourceDescriptor::url(&stream.url);
                self.fetch(&target, default_kind(descriptor.kind()), Some(stream.info))
                    .await?
            }
        };

        info!(
            source = %descriptor,
            path = %resolved.stream.local_path.display(),
            kind = ?resolved.stream.media_kind,
            "Source resolved"
        );
        Ok(resolved)
    }

    fn service_for(&self, descriptor: &SourceDescriptor) -> Result<&Arc<dyn ServiceLookup>> {
        let service = match descriptor.kind() {
            SourceKind::VideoService => self.video.as_ref(),
            SourceKind::AudioService => self.audio.as_ref(),
            SourceKind::Url => None,
        };
        service.ok_or_else(|| {
            ResolutionError::unavailable(
                &descriptor.source_id(),
                format!("no {} service configured", descriptor.kind()),
            )
        })
    }

    async fn fetch(
        &self,
        target: &SourceDescriptor,
        fallback: MediaKind,
        info: Option<TrackInfo>,
    ) -> Result<ResolvedSource> {
        let by_url = MediaKind::from_extension(&extension_from_url(target.identifier()));
        if by_url == Some(MediaKind::Bundle) {
            return self.unpack(target, info).await;
        }

        let handle = self.cache.resolve(target).await?;
        let by_format = info
            .as_ref()
            .and_then(|i| i.format.as_deref())
            .and_then(MediaKind::from_extension);

        let media_kind = match by_format.or(by_url) {
            Some(kind) => kind,
            None => MediaKind::sniff(handle.path(), fallback),
        };

        if media_kind == MediaKind::Bundle {
            // Keep the archive pinned until the bundle holds its own reference
            let unpacked = self.unpack(target, info).await;
            drop(handle);
            return unpacked;
        }

        Ok(ResolvedSource {
            stream: StreamDescriptor::new(handle.path(), media_kind),
            handle: Some(handle),
            info,
        })
    }

    async fn unpack(&self, target: &SourceDescriptor, info: Option<TrackInfo>) -> Result<ResolvedSource> {
        let bundle = self.cache.resolve_bundle(target).await?;
        let stream = select_bundle_media(bundle.files()).ok_or_else(|| {
            ResolutionError::not_found(&target.source_id(), "bundle contains no playable media")
        })?;
        debug!(
            source = %target,
            files = bundle.files().len(),
            primary = %stream.local_path.display(),
            "Bundle unpacked"
        );

        Ok(ResolvedSource {
            stream,
            handle: Some(bundle.into_handle()),
            info,
        })
    }
}

fn default_kind(kind: SourceKind) -> MediaKind {
    match kind {
        SourceKind::Url => MediaKind::Image,
        SourceKind::VideoService => MediaKind::Video,
        SourceKind::AudioService => MediaKind::Audio,
    }
}

/// Services may only hand out network transfers, never local paths
fn check_transfer_url(descriptor: &SourceDescriptor, transfer_url: &str) -> Result<()> {
    let scheme = Url::parse(transfer_url).map(|u| u.scheme().to_string());
    match scheme.as_deref() {
        Ok("http") | Ok("https") => Ok(()),
        _ => {
            warn!(source = %descriptor, url = transfer_url, "Service returned a non-HTTP transfer URL");
            Err(ResolutionError::unavailable(
                &descriptor.source_id(),
                format!("transfer URL is not http(s): {transfer_url}"),
            ))
        }
    }
}
