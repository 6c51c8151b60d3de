#![allow(dead_code)]

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Écrit un GIF animé d'images unies
pub fn write_gif(path: &Path, colors: &[[u8; 3]], width: u32, height: u32, delay_ms: u32) {
    let file = File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite).unwrap();

    let frames = colors.iter().map(|&[r, g, b]| {
        let buffer = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
        Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1))
    });
    encoder.encode_frames(frames).unwrap();
}

pub fn write_png(path: &Path, color: [u8; 3], width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb(color)).save(path).unwrap();
}

/// Écrit un WAV PCM 16 bits
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }

    File::create(path).unwrap().write_all(&out).unwrap();
}

/// Dent de scie, assez variée pour ne pas être triviale
pub fn saw(len: usize) -> Vec<i16> {
    (0..len).map(|i| ((i % 200) as i16 - 100) * 300).collect()
}

/// Écrit un flux YUV4MPEG2 (4:4:4) d'images grises unies
///
/// `levels` sont des niveaux RGB, convertis en luma de plage limitée.
pub fn write_y4m(path: &Path, levels: &[u8], width: u32, height: u32, fps: u32) {
    let plane = (width * height) as usize;
    let mut out = format!("YUV4MPEG2 W{width} H{height} F{fps}:1 Ip A1:1 C444\n").into_bytes();
    for &level in levels {
        let luma = (16 + level as u32 * 219 / 255) as u8;
        out.extend_from_slice(b"FRAME\n");
        out.extend(std::iter::repeat_n(luma, plane));
        out.extend(std::iter::repeat_n(128u8, plane * 2));
    }
    File::create(path).unwrap().write_all(&out).unwrap();
}
