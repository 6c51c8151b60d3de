//! # pxmplayer - Diffusion en temps réel
//!
//! Ce crate cadence la sortie d'une session de décodage: chaque image est
//! quantifiée puis remise au [`FrameSink`] de l'hôte à son heure de
//! présentation, chaque segment audio au [`AudioSink`].
//!
//! ## Fonctionnalités
//!
//! - Pipeline à étages bornés (décodage, quantification, audio) sur des
//!   threads dédiés, arrêtés par un `CancellationToken`
//! - Horloge de session monotone, pauses exclues
//! - Images en retard jetées au-delà d'un seuil, audio jamais jeté
//! - Machine d'états `Idle` → `Playing` ⇄ `Paused` → `Stopped`
//!
//! ## Utilisation
//!
//! ```no_run
//! use pxmdecode::{DecodeOptions, FrameDecoder};
//! use pxmdither::{DistanceMetric, DitherMode, Palette, QuantizedFrame, Quantizer};
//! use pxmplayer::{FrameSink, PlaybackConfig, PlaybackScheduler};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct Screen;
//!
//! impl FrameSink for Screen {
//!     fn on_frame(&mut self, frame: QuantizedFrame, _palette: &Palette) {
//!         println!("frame {} at {:?}", frame.index, frame.pts);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let palette = Palette::from_hex(&["#000000", "#ffffff"], DistanceMetric::default())?;
//! let quantizer = Quantizer::new(Arc::new(palette), DitherMode::FloydSteinberg);
//! let decode = FrameDecoder::default().open(Path::new("clip.gif"), DecodeOptions::default())?;
//!
//! let scheduler = PlaybackScheduler::new(PlaybackConfig::default());
//! let handle = scheduler.session(decode, quantizer, Screen).play()?;
//! let stats = handle.wait().await;
//! println!("{} frames, {} dropped", stats.frames_emitted, stats.frames_dropped);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod scheduler;
pub mod sink;
mod stages;
pub mod state;

pub use error::{PlayerError, Result};
pub use scheduler::{
    PlaybackConfig, PlaybackHandle, PlaybackScheduler, PlaybackSession, DEFAULT_AUDIO_QUEUE,
    DEFAULT_BACKLOG_THRESHOLD, DEFAULT_FRAME_QUEUE,
};
pub use sink::{AudioSink, FrameSink, PlaybackObserver, PlaybackStats, TracingObserver};
pub use state::PlaybackState;
