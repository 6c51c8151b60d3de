//! Decoded data

use image::imageops::FilterType;
use std::time::Duration;

/// One visual frame in RGB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Monotonic, zero-based
    pub index: u64,
    /// Presentation time, zero for the first frame of the session
    pub pts: Duration,
    pub width: u32,
    pub height: u32,
    /// Row-major RGB, 3 bytes per pixel
    pub pixels: Vec<u8>,
}

impl DecodedFrame {
    pub fn new(index: u64, pts: Duration, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            index,
            pts,
            width,
            height,
            pixels,
        }
    }

    /// Frame filled with a single color
    pub fn solid(index: u64, pts: Duration, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(index, pts, width, height, pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A run of interleaved audio samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Presentation time on the session time base
    pub pts: Duration,
    /// Interleaved samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioSegment {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Playback length of the segment
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Stream properties known after opening
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamInfo {
    /// Output width (after resizing); 0 for audio-only sessions
    pub width: u32,
    pub height: u32,
    /// Nominal frames per second, from the first frame interval
    pub frame_rate: Option<f64>,
    /// Total length when the container reports it
    pub duration: Option<Duration>,
    pub has_audio: bool,
}

impl StreamInfo {
    /// Nominal interval between two frames
    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_rate
            .filter(|r| r.is_finite() && *r > 0.0)
            .map(|r| Duration::from_secs_f64(1.0 / r))
    }
}

/// Options applied to every frame of a session
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Resize every frame to this pixel grid
    pub target_size: Option<(u32, u32)>,
    pub filter: FilterType,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            target_size: None,
            filter: FilterType::Triangle,
        }
    }
}

impl DecodeOptions {
    pub fn with_target_size(mut self, width: u32, height: u32) -> Self {
        self.target_size = Some((width, height));
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }
}
