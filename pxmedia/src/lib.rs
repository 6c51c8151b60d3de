//! # pxmedia - Media core
//!
//! Point d'entrée de l'hôte: [`MediaCore`] assemble le cache de contenu, le
//! résolveur de sources, le décodeur, la palette et l'ordonnanceur à partir
//! d'une [`Config`](pxmconfig::Config), puis lance des lectures.
//!
//! ```no_run
//! use pxmedia::{MediaCore, SourceDescriptor, TracingObserver};
//! use pxmdither::{Palette, QuantizedFrame};
//! use pxmplayer::FrameSink;
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
//! # async fn example() -> anyhow::Result<()> {
//! let config = pxmconfig::Config::load_config("")?;
//! pxmconfig::init_logging(&config.settings().logging)?;
//!
//! let core = MediaCore::from_config(&config)?;
//! let handle = core
//!     .play(
//!         &SourceDescriptor::video_service("https://youtu.be/dQw4w9WgXcQ"),
//!         Screen,
//!         None,
//!         Arc::new(TracingObserver),
//!     )
//!     .await?;
//! handle.wait().await;
//! # Ok(())
//! # }
//! ```

pub mod components;
mod media_core;

pub use media_core::{MediaCore, OpenedSource};
pub use pxmcache::SourceDescriptor;
pub use pxmplayer::{PlaybackHandle, PlaybackState, PlaybackStats, TracingObserver};
