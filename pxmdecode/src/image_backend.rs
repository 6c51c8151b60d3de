//! Still and animated images through the `image` crate
//!
//! Animated GIF, APNG and animated WebP are decoded frame by frame; any
//! other image is a one-frame stream. The animation decoders of `image` are
//! not `Send`, so each stream owns a producer thread.

use crate::backend::{RawFrame, VideoBackend, VideoProperties, VideoStream};
use crate::error::{DecodeError, Result};
use crate::producer::{self, Outbox};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, ImageDecoder, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Delay used for frames declaring none (as browsers do)
pub const DEFAULT_FRAME_DELAY_MS: u64 = 100;

/// Backend for GIF, PNG/APNG, WebP and JPEG files
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBackend;

impl VideoBackend for ImageBackend {
    fn name(&self) -> &str {
        "image"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VideoStream>> {
        producer::spawn_stream(path, "pxm-image-decode", run_producer)
    }
}

// ============================================================================
// Producer thread
// ============================================================================

fn open_buffered(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| DecodeError::from_io(path, e))
}

fn run_producer(path: &Path, tx: &Outbox) -> Result<()> {
    let img_err = |e: image::ImageError| DecodeError::from_image(path, e);

    let format = ImageReader::open(path)
        .map_err(|e| DecodeError::from_io(path, e))?
        .with_guessed_format()
        .map_err(|e| DecodeError::from_io(path, e))?
        .format()
        .ok_or_else(|| DecodeError::unsupported(path, "unrecognised image format"))?;

    match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(open_buffered(path)?).map_err(img_err)?;
            let (width, height) = decoder.dimensions();
            stream_frames(path, width, height, decoder.into_frames(), tx)
        }
        ImageFormat::Png => {
            let decoder = PngDecoder::new(open_buffered(path)?).map_err(img_err)?;
            if decoder.is_apng().map_err(img_err)? {
                let (width, height) = decoder.dimensions();
                let frames = decoder.apng().map_err(img_err)?.into_frames();
                stream_frames(path, width, height, frames, tx)
            } else {
                stream_still(path, tx)
            }
        }
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(open_buffered(path)?).map_err(img_err)?;
            if decoder.has_animation() {
                let (width, height) = decoder.dimensions();
                stream_frames(path, width, height, decoder.into_frames(), tx)
            } else {
                stream_still(path, tx)
            }
        }
        _ => stream_still(path, tx),
    }
}

fn frame_delay(frame: &image::Frame) -> Duration {
    let (numer, denom) = frame.delay().numer_denom_ms();
    if numer == 0 || denom == 0 {
        return Duration::from_millis(DEFAULT_FRAME_DELAY_MS);
    }
    Duration::from_nanos(numer as u64 * 1_000_000 / denom as u64)
}

fn stream_frames(
    path: &Path,
    width: u32,
    height: u32,
    frames: Frames<'_>,
    tx: &Outbox,
) -> Result<()> {
    let mut pts = Duration::ZERO;
    let mut opened = false;

    for frame in frames {
        let frame = frame.map_err(|e| DecodeError::from_image(path, e))?;
        let delay = frame_delay(&frame);

        if !opened {
            let properties = VideoProperties {
                width,
                height,
                frame_rate: Some(1.0 / delay.as_secs_f64()),
            };
            if !producer::send_opened(tx, properties) {
                return Ok(());
            }
            opened = true;
        }

        let image = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
        if !producer::send_frame(tx, RawFrame { pts, image }) {
            // Consumer gone
            return Ok(());
        }
        pts += delay;
    }

    if opened {
        Ok(())
    } else {
        Err(DecodeError::corrupt(path, "animation contains no frame"))
    }
}

fn stream_still(path: &Path, tx: &Outbox) -> Result<()> {
    let image = ImageReader::open(path)
        .map_err(|e| DecodeError::from_io(path, e))?
        .with_guessed_format()
        .map_err(|e| DecodeError::from_io(path, e))?
        .decode()
        .map_err(|e| DecodeError::from_image(path, e))?
        .to_rgb8();

    let properties = VideoProperties {
        width: image.width(),
        height: image.height(),
        frame_rate: None,
    };
    if producer::send_opened(tx, properties) {
        producer::send_frame(
            tx,
            RawFrame {
                pts: Duration::ZERO,
                image,
            },
        );
    }
    Ok(())
}
