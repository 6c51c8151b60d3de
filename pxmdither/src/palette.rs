//! Palettes and nearest-color lookup
//!
//! A [`Palette`] is built once and then only read. Construction also builds
//! the lookup grid: RGB space is cut into 16×16×16 cells and every cell
//! keeps the few palette entries that can be the nearest color of some
//! point inside it. Lookups scan that short list instead of the whole
//! palette and return exactly what a full scan would, ties going to the
//! lowest index.

use crate::metric::DistanceMetric;
use rayon::prelude::*;
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

/// Largest palette an index byte can address
pub const MAX_PALETTE_SIZE: usize = 256;

const GRID_BITS: u32 = 4;
const GRID_SIDE: usize = 1 << GRID_BITS;
const CELL_WIDTH: i32 = 256 / GRID_SIDE as i32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaletteError {
    #[error("Palette is empty")]
    Empty,

    #[error("Palette has {0} colors, at most {MAX_PALETTE_SIZE} are allowed")]
    TooLarge(usize),

    #[error("Invalid color {0:?}, expected #RRGGBB")]
    InvalidHex(String),

    #[error("All {0} palette entries are reserved")]
    AllReserved(usize),

    #[error("Invalid distance weights {0:?}")]
    InvalidMetric(DistanceMetric),
}

/// Ordered set of output colors
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    reserved: usize,
    metric: DistanceMetric,
    grid: Grid,
}

impl Palette {
    /// Build a palette and its lookup grid
    pub fn new(colors: Vec<[u8; 3]>, metric: DistanceMetric) -> Result<Self, PaletteError> {
        Self::build(colors, 0, metric)
    }

    /// Parse `#RRGGBB` (or `RRGGBB`) strings
    pub fn from_hex<S: AsRef<str>>(colors: &[S], metric: DistanceMetric) -> Result<Self, PaletteError> {
        let colors = colors
            .iter()
            .map(|c| parse_hex(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(colors, metric)
    }

    /// Exclude the first `count` entries from every lookup
    ///
    /// Reserved entries keep their index (a host palette may use them for
    /// transparency) but are never produced by quantization.
    pub fn with_reserved(self, count: usize) -> Result<Self, PaletteError> {
        if count == self.reserved {
            return Ok(self);
        }
        Self::build(self.colors, count, self.metric)
    }

    fn build(colors: Vec<[u8; 3]>, reserved: usize, metric: DistanceMetric) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        if colors.len() > MAX_PALETTE_SIZE {
            return Err(PaletteError::TooLarge(colors.len()));
        }
        if reserved >= colors.len() {
            return Err(PaletteError::AllReserved(colors.len()));
        }
        if !metric.is_valid() {
            return Err(PaletteError::InvalidMetric(metric));
        }

        let grid = Grid::build(&colors, reserved, &metric);
        debug!(
            colors = colors.len(),
            reserved,
            candidates = grid.indices.len(),
            "Palette lookup grid built"
        );

        Ok(Self {
            colors,
            reserved,
            metric,
            grid,
        })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn color(&self, index: u8) -> [u8; 3] {
        self.colors[index as usize]
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Index of the nearest selectable color
    pub fn nearest(&self, rgb: [u8; 3]) -> u8 {
        let cell = Grid::cell_of(rgb);
        let mut best = 0u8;
        let mut best_distance = f32::INFINITY;
        for &i in self.grid.candidates(cell) {
            let d = self.metric.distance(rgb, self.colors[i as usize]);
            if d < best_distance {
                best_distance = d;
                best = i;
            }
        }
        best
    }

    /// Reference lookup scanning every selectable entry
    pub fn nearest_exhaustive(&self, rgb: [u8; 3]) -> u8 {
        let mut best = self.reserved;
        let mut best_distance = f32::INFINITY;
        for (i, &color) in self.colors.iter().enumerate().skip(self.reserved) {
            let d = self.metric.distance(rgb, color);
            if d < best_distance {
                best_distance = d;
                best = i;
            }
        }
        best as u8
    }
}

fn parse_hex(s: &str) -> Result<[u8; 3], PaletteError> {
    let invalid = || PaletteError::InvalidHex(s.to_string());
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

// ============================================================================
// Lookup grid
// ============================================================================

#[derive(Debug, Clone)]
struct Grid {
    /// Candidate range of each cell in `indices`
    cells: Vec<Range<u32>>,
    /// Candidates of all cells, ascending within a cell
    indices: Vec<u8>,
}

impl Grid {
    fn cell_of(rgb: [u8; 3]) -> usize {
        let shift = 8 - GRID_BITS;
        ((rgb[0] as usize >> shift) * GRID_SIDE + (rgb[1] as usize >> shift)) * GRID_SIDE
            + (rgb[2] as usize >> shift)
    }

    fn candidates(&self, cell: usize) -> &[u8] {
        let range = &self.cells[cell];
        &self.indices[range.start as usize..range.end as usize]
    }

    fn build(colors: &[[u8; 3]], reserved: usize, metric: &DistanceMetric) -> Self {
        let (low_w, high_w) = metric.weight_bounds();

        let per_cell: Vec<Vec<u8>> = (0..GRID_SIDE * GRID_SIDE * GRID_SIDE)
            .into_par_iter()
            .map(|cell| {
                let origin = [
                    (cell / (GRID_SIDE * GRID_SIDE)) as i32 * CELL_WIDTH,
                    (cell / GRID_SIDE % GRID_SIDE) as i32 * CELL_WIDTH,
                    (cell % GRID_SIDE) as i32 * CELL_WIDTH,
                ];
                cell_candidates(origin, colors, reserved, low_w, high_w)
            })
            .collect();

        let mut cells = Vec::with_capacity(per_cell.len());
        let mut indices = Vec::new();
        for list in per_cell {
            let start = indices.len() as u32;
            indices.extend(list);
            cells.push(start..indices.len() as u32);
        }
        Self { cells, indices }
    }
}

/// Entries whose smallest possible distance to the cell does not exceed
/// the best largest possible distance
fn cell_candidates(
    origin: [i32; 3],
    colors: &[[u8; 3]],
    reserved: usize,
    low_w: [f32; 3],
    high_w: [f32; 3],
) -> Vec<u8> {
    let bounds: Vec<(usize, f32, f32)> = colors
        .iter()
        .enumerate()
        .skip(reserved)
        .map(|(i, color)| {
            let mut low = 0.0f32;
            let mut high = 0.0f32;
            for c in 0..3 {
                let lo = origin[c];
                let hi = origin[c] + CELL_WIDTH - 1;
                let v = color[c] as i32;
                let near = if v < lo {
                    lo - v
                } else if v > hi {
                    v - hi
                } else {
                    0
                } as f32;
                let far = (v - lo).abs().max((v - hi).abs()) as f32;
                low += low_w[c] * near * near;
                high += high_w[c] * far * far;
            }
            (i, low, high)
        })
        .collect();

    let best_high = bounds
        .iter()
        .map(|&(_, _, high)| high)
        .fold(f32::INFINITY, f32::min);

    bounds
        .into_iter()
        .filter(|&(_, low, _)| low <= best_high)
        .map(|(i, _, _)| i as u8)
        .collect()
}
