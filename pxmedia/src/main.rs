//! Lecteur en ligne de commande
//!
//! ```text
//! pxmedia <source> [config-dir]
//! ```
//!
//! `<source>` est une URL, `video:<id ou URL>` ou `audio:<recherche>`. Les
//! images sont résumées dans les logs; Ctrl+C arrête la lecture.

use anyhow::{bail, Result};
use pxmdither::{Palette, QuantizedFrame};
use pxmedia::{MediaCore, SourceDescriptor, TracingObserver};
use pxmplayer::FrameSink;
use std::sync::Arc;
use tracing::{debug, info};

/// Résume chaque image par sa couleur dominante
struct LogSink;

impl FrameSink for LogSink {
    fn on_frame(&mut self, frame: QuantizedFrame, palette: &Palette) {
        let mut histogram = [0usize; 256];
        for &i in &frame.indices {
            histogram[i as usize] += 1;
        }
        let dominant = histogram
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .map(|(i, _)| i as u8)
            .unwrap_or(0);
        let [r, g, b] = palette.color(dominant);
        debug!(
            index = frame.index,
            pts_ms = frame.pts.as_millis() as u64,
            dominant = format!("#{:02x}{:02x}{:02x}", r, g, b),
            "Frame"
        );
    }
}

fn parse_source(arg: &str) -> SourceDescriptor {
    if let Some(id) = arg.strip_prefix("video:") {
        SourceDescriptor::video_service(id)
    } else if let Some(query) = arg.strip_prefix("audio:") {
        SourceDescriptor::audio_service(query)
    } else {
        SourceDescriptor::url(arg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(source) = args.next() else {
        bail!("usage: pxmedia <url | video:<id> | audio:<query>> [config-dir]");
    };
    let config_dir = args.next().unwrap_or_default();

    let config = pxmconfig::Config::load_config(&config_dir)?;
    pxmconfig::init_logging(&config.settings().logging)?;

    let core = MediaCore::from_config(&config)?;
    let descriptor = parse_source(&source);
    let handle = core
        .play(&descriptor, LogSink, None, Arc::new(TracingObserver))
        .await?;

    let stats = tokio::select! {
        stats = handle.wait() => stats,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping playback");
            handle.stop();
            handle.wait().await
        }
    };

    info!(
        frames = stats.frames_emitted,
        dropped = stats.frames_dropped,
        segments = stats.segments_emitted,
        "Done"
    );
    if let Some(error) = handle.take_error() {
        return Err(error.into());
    }
    Ok(())
}
