//! # pxmdecode - Frame and audio decoding
//!
//! Opens a local media file and yields time-stamped RGB frames and
//! interleaved audio segments on a shared, zero-based time base.
//!
//! Codecs sit behind two narrow traits, [`VideoBackend`] and
//! [`AudioBackend`]. The default [`FrameDecoder`] combines:
//!
//! - [`ImageBackend`]: GIF, APNG, WebP (animated or not), PNG, JPEG
//! - `FfmpegBackend` (feature `ffmpeg`, on by default): MP4, WebM, MKV and
//!   the other containers FFmpeg demuxes, tried when `image` declines
//! - [`SymphoniaBackend`]: MP3, FLAC, WAV, OGG/Vorbis, AAC
//!
//! Timestamps handed out by a session never decrease, whatever the backend
//! reports.
//!
//! Decoding is blocking; async callers open sessions in `spawn_blocking`
//! and pull frames from a dedicated thread.
//!
//! ```no_run
//! use pxmdecode::{DecodeOptions, FrameDecoder};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), pxmdecode::DecodeError> {
//! let decoder = FrameDecoder::default();
//! let mut session = decoder.open(
//!     Path::new("clip.gif"),
//!     DecodeOptions::default().with_target_size(128, 128),
//! )?;
//! while let Some(frame) = session.next()? {
//!     println!("frame {} at {:?}", frame.index, frame.pts);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_backend;
pub mod frame;
pub mod image_backend;
mod producer;
pub mod session;
pub mod symphonia_backend;

pub use backend::{
    AudioBackend, AudioStream, RawFrame, VideoBackend, VideoBackendChain, VideoProperties,
    VideoStream,
};
pub use error::{DecodeError, Result};
pub use frame::{AudioSegment, DecodeOptions, DecodedFrame, StreamInfo};
pub use image::imageops::FilterType;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_backend::FfmpegBackend;
pub use image_backend::ImageBackend;
pub use producer::DECODE_AHEAD;
pub use session::{AudioTrack, DecodeSession, FrameDecoder};
pub use symphonia_backend::SymphoniaBackend;
