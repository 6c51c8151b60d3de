//! Construction des composants à partir des réglages

use anyhow::{bail, Context, Result};
use pxmconfig::{
    DitherSetting, MetricSetting, PlaybackSettings, QuantizerSettings, ServiceSettings,
};
use pxmdecode::DecodeOptions;
use pxmdither::{DistanceMetric, DitherMode, Palette};
use pxmplayer::PlaybackConfig;
use pxmsource::{AudioServiceClient, VideoServiceClient};
use std::time::Duration;

pub fn distance_metric(settings: &QuantizerSettings) -> DistanceMetric {
    match settings.metric {
        MetricSetting::Weighted => DistanceMetric::Weighted(settings.weights),
        MetricSetting::RedMean => DistanceMetric::RedMean,
    }
}

pub fn dither_mode(settings: &QuantizerSettings) -> DitherMode {
    match settings.dither {
        DitherSetting::None => DitherMode::None,
        DitherSetting::FloydSteinberg => DitherMode::FloydSteinberg,
        DitherSetting::Random => DitherMode::Random {
            weight: settings.random_weight,
        },
    }
}

/// Palette de la section `quantizer`, entrées réservées exclues
pub fn palette(settings: &QuantizerSettings) -> Result<Palette> {
    if settings.palette.is_empty() {
        bail!("quantizer.palette is empty");
    }
    let palette = Palette::from_hex(&settings.palette, distance_metric(settings))
        .context("Invalid quantizer.palette")?;
    palette
        .with_reserved(settings.reserved)
        .context("Invalid quantizer.reserved")
}

/// Redimensionnement quand la grille cible est complète
pub fn decode_options(settings: &QuantizerSettings) -> DecodeOptions {
    match (settings.target_width, settings.target_height) {
        (Some(width), Some(height)) => DecodeOptions::default().with_target_size(width, height),
        _ => DecodeOptions::default(),
    }
}

pub fn playback_config(settings: &PlaybackSettings) -> PlaybackConfig {
    PlaybackConfig {
        backlog_threshold: settings.backlog_threshold,
        frame_queue: settings.frame_queue,
        audio_queue: settings.audio_queue,
        max_lateness: None,
    }
}

/// Client du service vidéo, `None` sans `base_url`
pub fn video_client(settings: &ServiceSettings) -> Result<Option<VideoServiceClient>> {
    let Some(base_url) = settings.base_url.as_deref() else {
        return Ok(None);
    };

    let mut builder =
        VideoServiceClient::builder(base_url).timeout(Duration::from_secs(settings.timeout_secs));
    if let Some(key) = &settings.api_key {
        builder = builder.api_key(key);
    }
    if let Some(height) = settings.max_height {
        builder = builder.max_height(height);
    }
    let client = builder
        .build()
        .with_context(|| format!("Cannot build video service client for {}", base_url))?;
    Ok(Some(client))
}

/// Client du service audio, `None` sans `base_url`
pub fn audio_client(settings: &ServiceSettings) -> Result<Option<AudioServiceClient>> {
    let Some(base_url) = settings.base_url.as_deref() else {
        return Ok(None);
    };

    let mut builder =
        AudioServiceClient::builder(base_url).timeout(Duration::from_secs(settings.timeout_secs));
    if let Some(key) = &settings.api_key {
        builder = builder.api_key(key);
    }
    let client = builder
        .build()
        .with_context(|| format!("Cannot build audio service client for {}", base_url))?;
    Ok(Some(client))
}
