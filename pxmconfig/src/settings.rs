//! Typed configuration sections
//!
//! Every section deserializes from the merged YAML tree. Missing keys fall
//! back to the values of the embedded default configuration, so a
//! `config.yaml` only needs to carry what it changes.

use serde::{Deserialize, Serialize};

/// Default cache bound (2 GiB)
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Default timeout for service lookups
pub const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 30;
/// Default backlog threshold, in frames
pub const DEFAULT_BACKLOG_THRESHOLD: u32 = 3;

/// Root of the typed configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub quantizer: QuantizerSettings,
    pub playback: PlaybackSettings,
    pub services: ServicesSettings,
    pub logging: LoggingSettings,
}

/// `cache:` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache root, relative paths are resolved against the config directory
    pub directory: String,
    /// Aggregate size bound of the cache, in bytes
    pub max_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: "cache".to_string(),
            max_bytes: DEFAULT_CACHE_MAX_BYTES,
        }
    }
}

/// Dithering applied by the quantizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DitherSetting {
    None,
    #[default]
    FloydSteinberg,
    Random,
}

/// Color distance used for nearest-color lookup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricSetting {
    #[default]
    Weighted,
    RedMean,
}

/// `quantizer:` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuantizerSettings {
    pub dither: DitherSetting,
    /// Noise amplitude of the random dither (32 light, 64 normal, 128 heavy)
    pub random_weight: u8,
    pub metric: MetricSetting,
    /// Per-channel weights of the `weighted` metric (red, green, blue)
    pub weights: [f32; 3],
    /// Palette colors as `#RRGGBB` strings
    pub palette: Vec<String>,
    /// Number of leading palette entries that are never selected
    pub reserved: usize,
    /// Optional output grid, frames are resized to it when both are set
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
}

impl Default for QuantizerSettings {
    fn default() -> Self {
        Self {
            dither: DitherSetting::default(),
            random_weight: 64,
            metric: MetricSetting::default(),
            weights: [2.0, 4.0, 3.0],
            palette: Vec::new(),
            reserved: 0,
            target_width: None,
            target_height: None,
        }
    }
}

/// `playback:` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Lateness, in frame intervals, beyond which a frame is dropped
    pub backlog_threshold: u32,
    /// Capacity of the decoded and quantized frame channels
    pub frame_queue: usize,
    /// Capacity of the audio segment channel
    pub audio_queue: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            backlog_threshold: DEFAULT_BACKLOG_THRESHOLD,
            frame_queue: 16,
            audio_queue: 32,
        }
    }
}

/// `services:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicesSettings {
    pub video: ServiceSettings,
    pub audio: ServiceSettings,
}

/// Settings of one lookup service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Base URL of the lookup API, the service is disabled when absent
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Highest stream height accepted by the video service
    pub max_height: Option<u32>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: DEFAULT_SERVICE_TIMEOUT_SECS,
            max_height: None,
        }
    }
}

/// `logging:` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub console: bool,
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            ansi: true,
        }
    }
}
