#![allow(dead_code)]

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use pxmconfig::Config;
use pxmdither::{Palette, QuantizedFrame};
use pxmplayer::FrameSink;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const PALETTE: [&str; 4] = ["#000000", "#ffffff", "#ff0000", "#0000ff"];

/// Dix images unies: couleurs de la palette et couleurs intermédiaires
pub const FRAME_COLORS: [[u8; 3]; 10] = [
    [0, 0, 0],
    [255, 255, 255],
    [255, 0, 0],
    [0, 0, 255],
    [128, 128, 128],
    [200, 40, 40],
    [30, 30, 180],
    [240, 240, 240],
    [90, 90, 90],
    [128, 128, 128],
];

/// Écrit un GIF animé d'images unies de 8×8 à une image par seconde
pub fn write_clip(path: &Path) {
    let file = File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite).unwrap();

    let frames = FRAME_COLORS.iter().map(|&[r, g, b]| {
        let buffer = RgbaImage::from_pixel(8, 8, Rgba([r, g, b, 255]));
        Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(1_000, 1))
    });
    encoder.encode_frames(frames).unwrap();
}

pub fn config(dir: &Path, dither: &str) -> Config {
    let palette = PALETTE
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let yaml = format!(
        "cache:\n  directory: cache\n  max_bytes: 10485760\n\
         quantizer:\n  dither: {dither}\n  palette: [{palette}]\n\
         logging:\n  console: false\n"
    );
    Config::from_yaml(dir, &yaml).unwrap()
}

#[derive(Clone, Default)]
pub struct CollectingSink {
    pub frames: Arc<Mutex<Vec<QuantizedFrame>>>,
}

impl FrameSink for CollectingSink {
    fn on_frame(&mut self, frame: QuantizedFrame, _palette: &Palette) {
        self.frames.lock().unwrap().push(frame);
    }
}
