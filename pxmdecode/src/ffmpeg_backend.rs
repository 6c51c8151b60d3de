//! Video containers through FFmpeg (`ffmpeg-next`)
//!
//! Handles what the video services deliver: MP4, WebM, MKV, MOV and the
//! like. The best video stream is decoded and converted to RGB24 with
//! swscale on a producer thread. Attached pictures (cover art) are not
//! video and make the file audio-only.

use crate::backend::{RawFrame, VideoBackend, VideoProperties, VideoStream};
use crate::error::{DecodeError, Result};
use crate::producer::{self, Outbox};
use ffmpeg_next as ffmpeg;
use ffmpeg::format::stream::Disposition;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Rational, Rescale};
use image::RgbImage;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

fn init(path: &Path) -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();
    let ready = *INIT.get_or_init(|| {
        let ready = ffmpeg::init();
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        ready
    });
    ready.map_err(|e| DecodeError::unsupported(path, format!("ffmpeg unavailable: {e}")))
}

/// Backend for muxed video files
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl VideoBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VideoStream>> {
        init(path)?;
        producer::spawn_stream(path, "pxm-ffmpeg-decode", run_producer)
    }
}

fn frame_rate(rate: Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0).then(|| f64::from(rate))
}

fn to_duration(ts: i64, time_base: Rational) -> Duration {
    let micros = ts.rescale(time_base, Rational::new(1, 1_000_000));
    Duration::from_micros(micros.max(0) as u64)
}

/// Decoder state of one stream
struct Converter {
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    time_base: Rational,
    decoded: Video,
    rgb: Video,
    last_pts: Duration,
}

impl Converter {
    /// Sends every frame the decoder has ready; `false` once the consumer is gone
    fn drain(&mut self, path: &Path, tx: &Outbox) -> Result<bool> {
        while self.decoder.receive_frame(&mut self.decoded).is_ok() {
            self.scaler
                .run(&self.decoded, &mut self.rgb)
                .map_err(|e| DecodeError::from_ffmpeg(path, e))?;

            let pts = match self.decoded.timestamp().or(self.decoded.pts()) {
                Some(ts) => to_duration(ts, self.time_base),
                None => self.last_pts,
            };
            self.last_pts = pts;

            let image = rgb_image(&self.rgb)
                .ok_or_else(|| DecodeError::corrupt(path, "short RGB frame"))?;
            if !producer::send_frame(tx, RawFrame { pts, image }) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Copies a packed RGB24 frame, dropping the row padding
fn rgb_image(frame: &Video) -> Option<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let plane = frame.data(0);

    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let start = y * stride;
        data.extend_from_slice(plane.get(start..start + width * 3)?);
    }
    RgbImage::from_raw(frame.width(), frame.height(), data)
}

fn run_producer(path: &Path, tx: &Outbox) -> Result<()> {
    let ff_err = |e: ffmpeg::Error| DecodeError::from_ffmpeg(path, e);

    let mut input = ffmpeg::format::input(&path).map_err(|e| DecodeError::from_ffmpeg_open(path, e))?;

    let (index, time_base, rate, parameters) = {
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .filter(|s| !s.disposition().contains(Disposition::ATTACHED_PIC))
            .ok_or_else(|| DecodeError::unsupported(path, "no video stream"))?;
        let rate = frame_rate(stream.avg_frame_rate()).or_else(|| frame_rate(stream.rate()));
        (stream.index(), stream.time_base(), rate, stream.parameters())
    };

    let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(ff_err)?
        .decoder()
        .video()
        .map_err(ff_err)?;
    let (width, height) = (decoder.width(), decoder.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::corrupt(path, "video stream without dimensions"));
    }

    let scaler = scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg::format::Pixel::RGB24,
        width,
        height,
        scaling::Flags::BILINEAR,
    )
    .map_err(ff_err)?;

    let properties = VideoProperties {
        width,
        height,
        frame_rate: rate,
    };
    if !producer::send_opened(tx, properties) {
        return Ok(());
    }

    let mut converter = Converter {
        decoder,
        scaler,
        time_base,
        decoded: Video::empty(),
        rgb: Video::empty(),
        last_pts: Duration::ZERO,
    };

    for (stream, packet) in input.packets() {
        if stream.index() != index {
            continue;
        }
        // A damaged packet costs a frame, not the stream
        if let Err(e) = converter.decoder.send_packet(&packet) {
            debug!(path = %path.display(), error = %e, "Skipping undecodable packet");
            continue;
        }
        if !converter.drain(path, tx)? {
            return Ok(());
        }
    }

    converter.decoder.send_eof().map_err(ff_err)?;
    converter.drain(path, tx)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_follow_the_time_base() {
        let tb = Rational::new(1, 90_000);
        assert_eq!(to_duration(45_000, tb), Duration::from_millis(500));
        assert_eq!(to_duration(-3_000, tb), Duration::ZERO);
        assert_eq!(to_duration(3, Rational::new(1, 2)), Duration::from_millis(1500));
    }

    #[test]
    fn test_unknown_rate_is_none() {
        assert_eq!(frame_rate(Rational::new(0, 1)), None);
        assert_eq!(frame_rate(Rational::new(30_000, 1001)).map(|r| r.round()), Some(30.0));
    }
}
