//! Contexte de lecture

use crate::components;
use anyhow::{Context, Result};
use pxmcache::{CacheHandle, ContentCache, SourceDescriptor};
use pxmconfig::Config;
use pxmdecode::{DecodeOptions, DecodeSession, FrameDecoder};
use pxmdither::{Palette, Quantizer};
use pxmplayer::{
    AudioSink, FrameSink, PlaybackConfig, PlaybackHandle, PlaybackObserver, PlaybackScheduler,
};
use pxmsource::{ResolvedSource, SourceResolver, TrackInfo};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Une source prête à être diffusée
pub struct OpenedSource {
    pub session: DecodeSession,
    /// Garde l'entrée de cache tant que la session vit
    pub handle: Option<CacheHandle>,
    pub info: Option<TrackInfo>,
}

/// Composants partagés par toutes les lectures
///
/// Tout est construit explicitement, par [`MediaCore::from_config`] ou
/// [`MediaCore::new`], puis passé aux sessions: il n'y a aucune instance
/// globale.
#[derive(Clone)]
pub struct MediaCore {
    cache: ContentCache,
    resolver: SourceResolver,
    decoder: FrameDecoder,
    decode_options: DecodeOptions,
    quantizer: Quantizer,
    scheduler: PlaybackScheduler,
}

impl MediaCore {
    pub fn new(
        resolver: SourceResolver,
        decoder: FrameDecoder,
        decode_options: DecodeOptions,
        quantizer: Quantizer,
        playback: PlaybackConfig,
    ) -> Self {
        Self {
            cache: resolver.cache().clone(),
            resolver,
            decoder,
            decode_options,
            quantizer,
            scheduler: PlaybackScheduler::new(playback),
        }
    }

    /// Construit tous les composants à partir de la configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.settings();

        let cache_dir = config.cache_dir()?;
        let cache = ContentCache::new(&cache_dir, settings.cache.max_bytes)
            .with_context(|| format!("Cannot open content cache in {}", cache_dir.display()))?;

        let services = &settings.services;
        let mut resolver = SourceResolver::new(cache).with_lookup_timeout(Duration::from_secs(
            services.video.timeout_secs.max(services.audio.timeout_secs),
        ));
        if let Some(client) = components::video_client(&services.video)? {
            info!(base_url = client.base_url(), "Video service enabled");
            resolver = resolver.with_video_service(Arc::new(client));
        }
        if let Some(client) = components::audio_client(&services.audio)? {
            info!(base_url = client.base_url(), "Audio service enabled");
            resolver = resolver.with_audio_service(Arc::new(client));
        }

        let palette = components::palette(&settings.quantizer)?;
        let quantizer = Quantizer::new(
            Arc::new(palette),
            components::dither_mode(&settings.quantizer),
        );

        info!(
            cache_dir = %cache_dir.display(),
            max_bytes = settings.cache.max_bytes,
            colors = quantizer.palette().len(),
            dither = ?quantizer.mode(),
            "Media core ready"
        );

        Ok(Self::new(
            resolver,
            FrameDecoder::default(),
            components::decode_options(&settings.quantizer),
            quantizer,
            components::playback_config(&settings.playback),
        ))
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    pub fn palette(&self) -> &Arc<Palette> {
        self.quantizer.palette()
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Résout la source puis ouvre une session de décodage
    pub async fn open(&self, descriptor: &SourceDescriptor) -> Result<OpenedSource> {
        let ResolvedSource {
            stream,
            handle,
            info,
        } = self
            .resolver
            .resolve(descriptor)
            .await
            .with_context(|| format!("Cannot resolve {}", descriptor))?;

        let decoder = self.decoder.clone();
        let options = self.decode_options;
        let path = stream.local_path.clone();
        let audio_path = stream.audio_path.clone();
        let session = tokio::task::spawn_blocking(move || {
            decoder.open_with_audio(&path, audio_path.as_deref(), options)
        })
        .await
        .context("Decoder task failed")?
        .with_context(|| format!("Cannot decode {}", stream.local_path.display()))?;

        info!(
            source = %descriptor,
            path = %stream.local_path.display(),
            kind = ?stream.media_kind,
            width = session.info().width,
            height = session.info().height,
            "Source opened"
        );

        Ok(OpenedSource {
            session,
            handle,
            info,
        })
    }

    /// Résout, décode et démarre la diffusion
    ///
    /// L'entrée de cache est confiée à la session et rendue à son arrêt.
    pub async fn play(
        &self,
        descriptor: &SourceDescriptor,
        frame_sink: impl FrameSink,
        audio_sink: Option<Box<dyn AudioSink>>,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Result<PlaybackHandle> {
        let opened = self.open(descriptor).await?;

        let mut session = self
            .scheduler
            .session(opened.session, self.quantizer.clone(), frame_sink)
            .with_observer(observer);
        if let Some(sink) = audio_sink {
            session = session.with_audio_sink(sink);
        }
        if let Some(handle) = opened.handle {
            session = session.with_cache_handle(handle);
        }

        let handle = session
            .play()
            .with_context(|| format!("Cannot start playback of {}", descriptor))?;
        Ok(handle)
    }
}
