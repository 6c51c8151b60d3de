//! Audio tracks through `symphonia`
//!
//! Packets are decoded one at a time into interleaved `f32` segments.
//! Timestamps come from the running sample count, so the first segment
//! starts at zero.

use crate::backend::{AudioBackend, AudioStream};
use crate::error::{DecodeError, Result};
use crate::frame::AudioSegment;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Backend for MP3, FLAC, WAV, OGG/Vorbis and AAC files
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaBackend;

impl AudioBackend for SymphoniaBackend {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn open(&self, path: &Path) -> Result<Option<Box<dyn AudioStream>>> {
        let file = File::open(path).map_err(|e| DecodeError::from_io(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let recognised = match symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) {
            Ok(recognised) => recognised,
            // Not an audio container (an image, for instance)
            Err(SymphoniaError::Unsupported(_)) => {
                debug!(path = %path.display(), "No audio container recognised");
                return Ok(None);
            }
            Err(e) => return Err(DecodeError::from_symphonia(path, e)),
        };

        let format = recognised.format;
        let Some(track) = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        else {
            return Ok(None);
        };

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::from_symphonia(path, e))?;

        let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);
        let duration = match (track.codec_params.n_frames, sample_rate) {
            (Some(frames), rate) if rate > 0 => {
                Some(Duration::from_secs_f64(frames as f64 / rate as f64))
            }
            _ => None,
        };
        let track_id = track.id;

        debug!(
            path = %path.display(),
            sample_rate,
            channels,
            duration = ?duration,
            "Audio track opened"
        );

        Ok(Some(Box::new(SymphoniaStream {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            frames_emitted: 0,
            skipped_packets: 0,
            finished: false,
        })))
    }
}

struct SymphoniaStream {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    duration: Option<Duration>,
    frames_emitted: u64,
    skipped_packets: u64,
    finished: bool,
}

impl SymphoniaStream {
    fn pts(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames_emitted as f64 / self.sample_rate as f64)
    }
}

impl AudioStream for SymphoniaStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn next_segment(&mut self) -> Result<Option<AudioSegment>> {
        while !self.finished {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(DecodeError::from_symphonia(&self.path, e));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);

                    let channels = spec.channels.count() as u16;
                    let segment = AudioSegment {
                        pts: self.pts(),
                        samples: sample_buf.samples().to_vec(),
                        sample_rate: spec.rate,
                        channels,
                    };
                    self.sample_rate = spec.rate;
                    self.channels = channels;
                    self.frames_emitted += segment.frames() as u64;
                    return Ok(Some(segment));
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    // Damaged packet: skip it, as players do
                    self.skipped_packets += 1;
                    warn!(path = %self.path.display(), "Skipping undecodable packet: {}", reason);
                    continue;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(DecodeError::from_symphonia(&self.path, e));
                }
            }
        }

        if self.skipped_packets > 0 {
            debug!(
                path = %self.path.display(),
                skipped = self.skipped_packets,
                "Audio stream finished with skipped packets"
            );
            self.skipped_packets = 0;
        }
        Ok(None)
    }
}
