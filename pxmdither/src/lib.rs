//! # pxmdither - Palette quantization
//!
//! Maps decoded RGB frames onto a fixed palette of at most 256 colors,
//! optionally dithered.
//!
//! - [`Palette`]: ordered colors plus a lookup grid built once, shared
//!   read-only (usually behind an `Arc`)
//! - [`DistanceMetric`]: weighted squared RGB distance, or the red-mean
//!   approximation
//! - [`quantize`]: pure function from a [`DecodedFrame`](pxmdecode::DecodedFrame)
//!   to a [`QuantizedFrame`]
//!
//! ```
//! use pxmdither::{quantize, DistanceMetric, DitherMode, Palette};
//! use pxmdecode::DecodedFrame;
//! use std::time::Duration;
//!
//! let palette = Palette::from_hex(&["#000000", "#ffffff"], DistanceMetric::default()).unwrap();
//! let frame = DecodedFrame::solid(0, Duration::ZERO, 4, 4, [200, 200, 200]);
//! let out = quantize(&frame, &palette, DitherMode::None);
//! assert!(out.indices.iter().all(|&i| i == 1));
//! ```

pub mod dither;
pub mod frame;
pub mod metric;
pub mod palette;

pub use dither::{quantize, DitherMode, Quantizer, RANDOM_HEAVY, RANDOM_LIGHT, RANDOM_NORMAL};
pub use frame::QuantizedFrame;
pub use metric::{DistanceMetric, DEFAULT_WEIGHTS};
pub use palette::{Palette, PaletteError, MAX_PALETTE_SIZE};
