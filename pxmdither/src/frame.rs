use crate::palette::Palette;
use std::time::Duration;

/// A frame expressed as palette indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedFrame {
    /// Index of the source frame
    pub index: u64,
    pub pts: Duration,
    pub width: u32,
    pub height: u32,
    /// Row-major, one palette index per pixel
    pub indices: Vec<u8>,
}

impl QuantizedFrame {
    pub fn index_at(&self, x: u32, y: u32) -> u8 {
        self.indices[y as usize * self.width as usize + x as usize]
    }

    /// Expand back to RGB through `palette`
    pub fn to_rgb(&self, palette: &Palette) -> Vec<u8> {
        self.indices
            .iter()
            .flat_map(|&i| palette.color(i))
            .collect()
    }
}
