//! Frame quantization
//!
//! Three modes are available:
//!
//! - [`DitherMode::None`]: every pixel takes its nearest palette color.
//! - [`DitherMode::FloydSteinberg`]: error diffusion, left to right and top
//!   to bottom, with the classic 7/16, 3/16, 5/16, 1/16 kernel. The target
//!   color (pixel plus carried error) is clamped to the RGB cube before the
//!   lookup, so the error carried to any pixel stays within one cube edge.
//! - [`DitherMode::Random`]: each channel is offset by a uniform value in
//!   `[-weight, weight]` before the lookup. The generator is seeded from the
//!   frame index and the row, so a frame always quantizes the same way.
//!
//! All modes are pure: the same frame, palette and mode give the same
//! indices, and no state survives between frames.

use crate::frame::QuantizedFrame;
use crate::palette::Palette;
use pxmdecode::DecodedFrame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;

/// Light noise amplitude for [`DitherMode::Random`]
pub const RANDOM_LIGHT: u8 = 32;
/// Normal noise amplitude for [`DitherMode::Random`]
pub const RANDOM_NORMAL: u8 = 64;
/// Heavy noise amplitude for [`DitherMode::Random`]
pub const RANDOM_HEAVY: u8 = 128;

// Poids du noyau de Floyd–Steinberg, en seizièmes
const FS_RIGHT: i32 = 7;
const FS_BELOW_LEFT: i32 = 3;
const FS_BELOW: i32 = 5;
const FS_BELOW_RIGHT: i32 = 1;
const FS_SCALE: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherMode {
    None,
    #[default]
    FloydSteinberg,
    Random {
        weight: u8,
    },
}

/// Map every pixel of `frame` to a palette index
pub fn quantize(frame: &DecodedFrame, palette: &Palette, mode: DitherMode) -> QuantizedFrame {
    let width = frame.width as usize;
    let indices = if width == 0 || frame.height == 0 {
        Vec::new()
    } else {
        match mode {
            DitherMode::None => nearest_only(frame, palette),
            DitherMode::FloydSteinberg => floyd_steinberg(frame, palette),
            DitherMode::Random { weight } => random(frame, palette, weight),
        }
    };

    QuantizedFrame {
        index: frame.index,
        pts: frame.pts,
        width: frame.width,
        height: frame.height,
        indices,
    }
}

fn nearest_only(frame: &DecodedFrame, palette: &Palette) -> Vec<u8> {
    frame
        .pixels
        .par_chunks_exact(3)
        .map(|p| palette.nearest([p[0], p[1], p[2]]))
        .collect()
}

fn floyd_steinberg(frame: &DecodedFrame, palette: &Palette) -> Vec<u8> {
    let width = frame.width as usize;
    let mut indices = Vec::with_capacity(frame.pixel_count());

    // Erreur en seizièmes, décalée d'une colonne de chaque côté
    let mut current = vec![[0i32; 3]; width + 2];
    let mut below = vec![[0i32; 3]; width + 2];

    for row in frame.pixels.chunks_exact(width * 3) {
        for (x, p) in row.chunks_exact(3).enumerate() {
            let carried = current[x + 1];
            let mut target = [0u8; 3];
            for c in 0..3 {
                let scaled = p[c] as i32 * FS_SCALE + carried[c];
                target[c] = (scaled + FS_SCALE / 2).div_euclid(FS_SCALE).clamp(0, 255) as u8;
            }

            let chosen = palette.nearest(target);
            let color = palette.color(chosen);
            indices.push(chosen);

            for c in 0..3 {
                let error = target[c] as i32 - color[c] as i32;
                current[x + 2][c] += error * FS_RIGHT;
                below[x][c] += error * FS_BELOW_LEFT;
                below[x + 1][c] += error * FS_BELOW;
                below[x + 2][c] += error * FS_BELOW_RIGHT;
            }
        }
        std::mem::swap(&mut current, &mut below);
        below.fill([0; 3]);
    }

    indices
}

fn random(frame: &DecodedFrame, palette: &Palette, weight: u8) -> Vec<u8> {
    let width = frame.width as usize;
    let amplitude = weight as i32;
    let frame_seed = frame.index.wrapping_mul(0x9E37_79B9_7F4A_7C15);

    frame
        .pixels
        .par_chunks_exact(width * 3)
        .enumerate()
        .flat_map_iter(|(y, row)| {
            let mut rng = StdRng::seed_from_u64(frame_seed ^ y as u64);
            row.chunks_exact(3)
                .map(|p| {
                    let mut target = [0u8; 3];
                    for c in 0..3 {
                        let offset = rng.random_range(-amplitude..=amplitude);
                        target[c] = (p[c] as i32 + offset).clamp(0, 255) as u8;
                    }
                    palette.nearest(target)
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// A palette and a dither mode, shared by the playback stages
#[derive(Debug, Clone)]
pub struct Quantizer {
    palette: Arc<Palette>,
    mode: DitherMode,
}

impl Quantizer {
    pub fn new(palette: Arc<Palette>, mode: DitherMode) -> Self {
        Self { palette, mode }
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.palette
    }

    pub fn mode(&self) -> DitherMode {
        self.mode
    }

    pub fn quantize(&self, frame: &DecodedFrame) -> QuantizedFrame {
        quantize(frame, &self.palette, self.mode)
    }
}
