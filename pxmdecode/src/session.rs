//! Decode sessions
//!
//! A [`FrameDecoder`] pairs one video backend with one audio backend. Each
//! call to [`FrameDecoder::open`] yields an independent [`DecodeSession`]:
//! a lazy, finite, forward-only sequence of frames plus a separately
//! consumable [`AudioTrack`], both rebased to start at zero.

use crate::backend::{AudioBackend, AudioStream, VideoBackend, VideoBackendChain, VideoStream};
use crate::error::{DecodeError, Result};
use crate::frame::{AudioSegment, DecodeOptions, DecodedFrame, StreamInfo};
use crate::image_backend::ImageBackend;
use crate::symphonia_backend::SymphoniaBackend;
use image::imageops;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Factory of decode sessions
#[derive(Clone)]
pub struct FrameDecoder {
    video: Arc<dyn VideoBackend>,
    audio: Arc<dyn AudioBackend>,
}

impl Default for FrameDecoder {
    /// Images first, then video containers when built with `ffmpeg`
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut video: Vec<Arc<dyn VideoBackend>> = vec![Arc::new(ImageBackend)];
        #[cfg(feature = "ffmpeg")]
        video.push(Arc::new(crate::ffmpeg_backend::FfmpegBackend));

        Self::new(
            Arc::new(VideoBackendChain::new(video)),
            Arc::new(SymphoniaBackend),
        )
    }
}

impl FrameDecoder {
    pub fn new(video: Arc<dyn VideoBackend>, audio: Arc<dyn AudioBackend>) -> Self {
        Self { video, audio }
    }

    /// Open a file holding frames, audio or both
    ///
    /// A file the video backend cannot read still opens as an audio-only
    /// session when the audio backend finds a track in it.
    pub fn open(&self, path: &Path, options: DecodeOptions) -> Result<DecodeSession> {
        self.open_with_audio(path, None, options)
    }

    /// Open a visual file with an optional separate audio file
    pub fn open_with_audio(
        &self,
        path: &Path,
        audio_path: Option<&Path>,
        options: DecodeOptions,
    ) -> Result<DecodeSession> {
        let audio_source = audio_path.unwrap_or(path);
        let video = self.video.open(path);

        // Audio problems never prevent showing the frames
        let audio = match self.audio.open(audio_source) {
            Ok(audio) => audio,
            Err(e) => {
                debug!(path = %audio_source.display(), error = %e, "Audio track unavailable");
                None
            }
        };

        let video = match video {
            Ok(video) => Some(video),
            Err(DecodeError::UnsupportedCodec { .. }) if audio.is_some() && audio_path.is_none() => {
                debug!(path = %path.display(), "Opening as audio-only");
                None
            }
            Err(e) => return Err(e),
        };

        let session = DecodeSession::new(path.to_path_buf(), video, audio, options);
        info!(
            path = %path.display(),
            video = self.video.name(),
            audio = self.audio.name(),
            width = session.info.width,
            height = session.info.height,
            has_audio = session.info.has_audio,
            "Decode session opened"
        );
        Ok(session)
    }
}

/// One pass over a media file
///
/// Frames come out with monotonic indices starting at zero; once `next`
/// returns `None` the session is exhausted for good.
pub struct DecodeSession {
    path: PathBuf,
    video: Option<Box<dyn VideoStream>>,
    audio: Option<AudioTrack>,
    options: DecodeOptions,
    info: StreamInfo,
    next_index: u64,
    base_pts: Option<Duration>,
    last_pts: Duration,
}

impl DecodeSession {
    fn new(
        path: PathBuf,
        video: Option<Box<dyn VideoStream>>,
        audio: Option<Box<dyn AudioStream>>,
        options: DecodeOptions,
    ) -> Self {
        let (width, height, frame_rate) = match &video {
            Some(video) => {
                let props = video.properties();
                let (w, h) = options.target_size.unwrap_or((props.width, props.height));
                (w, h, props.frame_rate)
            }
            None => (0, 0, None),
        };

        let info = StreamInfo {
            width,
            height,
            frame_rate,
            duration: audio.as_ref().and_then(|a| a.duration()),
            has_audio: audio.is_some(),
        };

        Self {
            path,
            video,
            audio: Some(AudioTrack::new(audio)),
            options,
            info,
            next_index: 0,
            base_pts: None,
            last_pts: Duration::ZERO,
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next frame, `None` at end of stream
    ///
    /// A backend error ends the visual stream; later calls return `None`.
    pub fn next(&mut self) -> Result<Option<DecodedFrame>> {
        let Some(video) = self.video.as_mut() else {
            return Ok(None);
        };

        let raw = match video.next_frame() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(path = %self.path.display(), frames = self.next_index, "Visual stream finished");
                self.video = None;
                return Ok(None);
            }
            Err(e) => {
                self.video = None;
                return Err(e);
            }
        };

        let base = *self.base_pts.get_or_insert(raw.pts);
        let pts = monotonic(raw.pts.saturating_sub(base), &mut self.last_pts, "frame");

        let image = match self.options.target_size {
            Some((w, h)) if (w, h) != raw.image.dimensions() && w > 0 && h > 0 => {
                imageops::resize(&raw.image, w, h, self.options.filter)
            }
            _ => raw.image,
        };

        let (width, height) = image.dimensions();
        let frame = DecodedFrame::new(self.next_index, pts, width, height, image.into_raw());
        self.next_index += 1;
        Ok(Some(frame))
    }

    /// Take the audio sequence of this session
    ///
    /// The track is independent from the frames and can be consumed from
    /// another thread. Later calls return an empty track.
    pub fn audio(&mut self) -> AudioTrack {
        self.audio.take().unwrap_or_else(|| AudioTrack::new(None))
    }

    /// Release the backend streams; idempotent
    pub fn close(&mut self) {
        if self.video.is_some() || self.audio.is_some() {
            debug!(path = %self.path.display(), "Decode session closed");
        }
        self.video = None;
        self.audio = None;
    }

    pub fn is_closed(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// Timestamps never go backwards; a regressing one is held at the previous
fn monotonic(pts: Duration, last: &mut Duration, what: &'static str) -> Duration {
    if pts < *last {
        debug!(pts = ?pts, previous = ?*last, what, "Timestamp going backwards, clamped");
        return *last;
    }
    *last = pts;
    pts
}

/// Lazy sequence of audio segments, rebased to zero
pub struct AudioTrack {
    stream: Option<Box<dyn AudioStream>>,
    base_pts: Option<Duration>,
    last_pts: Duration,
}

impl AudioTrack {
    fn new(stream: Option<Box<dyn AudioStream>>) -> Self {
        Self {
            stream,
            base_pts: None,
            last_pts: Duration::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_none()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.stream.as_ref().map(|s| s.sample_rate())
    }

    pub fn channels(&self) -> Option<u16> {
        self.stream.as_ref().map(|s| s.channels())
    }

    /// Next segment, `None` at end of stream
    pub fn next_segment(&mut self) -> Result<Option<AudioSegment>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match stream.next_segment() {
            Ok(Some(mut segment)) => {
                let base = *self.base_pts.get_or_insert(segment.pts);
                segment.pts =
                    monotonic(segment.pts.saturating_sub(base), &mut self.last_pts, "segment");
                Ok(Some(segment))
            }
            Ok(None) => {
                self.stream = None;
                Ok(None)
            }
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }
}

impl Iterator for AudioTrack {
    type Item = Result<AudioSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}
