//! Backend traits
//!
//! Codec libraries live behind these traits; the session only sees RGB
//! images with timestamps and interleaved audio segments.

use crate::error::{DecodeError, Result};
use crate::frame::AudioSegment;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Frame produced by a video stream, before rebasing and resizing
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub pts: Duration,
    pub image: RgbImage,
}

/// Properties reported by a video stream when opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

pub trait VideoBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open the visual stream of a file
    fn open(&self, path: &Path) -> Result<Box<dyn VideoStream>>;
}

pub trait VideoStream: Send {
    fn properties(&self) -> VideoProperties;

    /// Next frame in presentation order, `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Tries each backend in turn
///
/// A backend answering `UnsupportedCodec` hands over to the next one; any
/// other error ends the search.
#[derive(Clone)]
pub struct VideoBackendChain {
    backends: Vec<Arc<dyn VideoBackend>>,
    name: String,
}

impl VideoBackendChain {
    pub fn new(backends: Vec<Arc<dyn VideoBackend>>) -> Self {
        let name = backends
            .iter()
            .map(|b| b.name())
            .collect::<Vec<_>>()
            .join("+");
        Self { backends, name }
    }
}

impl VideoBackend for VideoBackendChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VideoStream>> {
        let mut last = None;
        for backend in &self.backends {
            match backend.open(path) {
                Err(e @ DecodeError::UnsupportedCodec { .. }) => {
                    trace!(path = %path.display(), backend = backend.name(), error = %e, "Backend declined");
                    last = Some(e);
                }
                other => return other,
            }
        }
        Err(last.unwrap_or_else(|| DecodeError::unsupported(path, "no video backend")))
    }
}

pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open the first audio track of a file; `None` if the file has none
    fn open(&self, path: &Path) -> Result<Option<Box<dyn AudioStream>>>;
}

pub trait AudioStream: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Total length when known
    fn duration(&self) -> Option<Duration>;

    /// Next segment, `None` at end of stream
    fn next_segment(&mut self) -> Result<Option<AudioSegment>>;
}
