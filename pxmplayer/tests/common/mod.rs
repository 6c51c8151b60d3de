#![allow(dead_code)]

use image::{Rgb, RgbImage};
use pxmdecode::{
    AudioBackend, AudioSegment, AudioStream, DecodeError, DecodeOptions, DecodeSession,
    FrameDecoder, RawFrame, VideoBackend, VideoProperties, VideoStream,
};
use pxmdither::{DistanceMetric, DitherMode, Palette, QuantizedFrame, Quantizer};
use pxmplayer::{AudioSink, FrameSink, PlaybackObserver, PlaybackState, PlaybackStats, PlayerError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const AUDIO_RATE: u32 = 8_000;

// ============================================================================
// Backends synthétiques
// ============================================================================

/// Flux vidéo synthétique: `frames` images de 4×4 espacées de `interval`
#[derive(Default)]
pub struct FakeVideo {
    pub frames: u64,
    pub interval: Duration,
    /// Le décodage de cette image attend un signal sur `gate`
    pub gate_at: Option<u64>,
    pub gate: Mutex<Option<std_mpsc::Receiver<()>>>,
    /// Le décodage de cette image échoue
    pub fail_at: Option<u64>,
    /// Passe à `true` quand le flux est libéré
    pub closed: Arc<AtomicBool>,
    /// Pas de piste vidéo du tout
    pub absent: bool,
}

impl FakeVideo {
    pub fn new(frames: u64, interval: Duration) -> Self {
        Self {
            frames,
            interval,
            ..Self::default()
        }
    }

    pub fn gated_at(mut self, index: u64) -> (Self, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        self.gate_at = Some(index);
        self.gate = Mutex::new(Some(rx));
        (self, tx)
    }

    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn absent() -> Self {
        Self {
            absent: true,
            ..Self::default()
        }
    }
}

impl VideoBackend for FakeVideo {
    fn name(&self) -> &str {
        "fake-video"
    }

    fn open(&self, path: &Path) -> pxmdecode::Result<Box<dyn VideoStream>> {
        if self.absent {
            return Err(DecodeError::unsupported(path, "none"));
        }
        Ok(Box::new(FakeVideoStream {
            next: 0,
            frames: self.frames,
            interval: self.interval,
            gate_at: self.gate_at,
            gate: self.gate.lock().unwrap().take(),
            fail_at: self.fail_at,
            closed: self.closed.clone(),
        }))
    }
}

struct FakeVideoStream {
    next: u64,
    frames: u64,
    interval: Duration,
    gate_at: Option<u64>,
    gate: Option<std_mpsc::Receiver<()>>,
    fail_at: Option<u64>,
    closed: Arc<AtomicBool>,
}

impl VideoStream for FakeVideoStream {
    fn properties(&self) -> VideoProperties {
        VideoProperties {
            width: 4,
            height: 4,
            frame_rate: Some(1.0 / self.interval.as_secs_f64()),
        }
    }

    fn next_frame(&mut self) -> pxmdecode::Result<Option<RawFrame>> {
        if self.next >= self.frames {
            return Ok(None);
        }
        if self.fail_at == Some(self.next) {
            return Err(DecodeError::corrupt(Path::new("fake"), "broken frame"));
        }
        if self.gate_at == Some(self.next) {
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
        }

        let pts = self.interval * self.next as u32;
        let shade = (self.next * 40 % 256) as u8;
        self.next += 1;
        Ok(Some(RawFrame {
            pts,
            image: RgbImage::from_pixel(4, 4, Rgb([shade; 3])),
        }))
    }
}

impl Drop for FakeVideoStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Piste audio synthétique: `segments` segments mono de `length`
#[derive(Default)]
pub struct FakeAudio {
    pub segments: u64,
    pub length: Duration,
    pub gate_at: Option<u64>,
    pub gate: Mutex<Option<std_mpsc::Receiver<()>>>,
}

impl FakeAudio {
    pub fn new(segments: u64, length: Duration) -> Self {
        Self {
            segments,
            length,
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn gated_at(mut self, index: u64) -> (Self, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        self.gate_at = Some(index);
        self.gate = Mutex::new(Some(rx));
        (self, tx)
    }
}

impl AudioBackend for FakeAudio {
    fn name(&self) -> &str {
        "fake-audio"
    }

    fn open(&self, _path: &Path) -> pxmdecode::Result<Option<Box<dyn AudioStream>>> {
        if self.segments == 0 {
            return Ok(None);
        }
        Ok(Some(Box::new(FakeAudioStream {
            next: 0,
            segments: self.segments,
            length: self.length,
            gate_at: self.gate_at,
            gate: self.gate.lock().unwrap().take(),
        })))
    }
}

struct FakeAudioStream {
    next: u64,
    segments: u64,
    length: Duration,
    gate_at: Option<u64>,
    gate: Option<std_mpsc::Receiver<()>>,
}

impl AudioStream for FakeAudioStream {
    fn sample_rate(&self) -> u32 {
        AUDIO_RATE
    }

    fn channels(&self) -> u16 {
        1
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.length * self.segments as u32)
    }

    fn next_segment(&mut self) -> pxmdecode::Result<Option<AudioSegment>> {
        if self.next >= self.segments {
            return Ok(None);
        }
        if self.gate_at == Some(self.next) {
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
        }

        let frames = (AUDIO_RATE as f64 * self.length.as_secs_f64()) as usize;
        let pts = self.length * self.next as u32;
        self.next += 1;
        Ok(Some(AudioSegment {
            pts,
            samples: vec![0.0; frames],
            sample_rate: AUDIO_RATE,
            channels: 1,
        }))
    }
}

pub fn open_session(video: FakeVideo, audio: FakeAudio) -> DecodeSession {
    FrameDecoder::new(Arc::new(video), Arc::new(audio))
        .open(Path::new("synthetic"), DecodeOptions::default())
        .unwrap()
}

pub fn gray_quantizer() -> Quantizer {
    let palette = Palette::from_hex(
        &["#000000", "#555555", "#aaaaaa", "#ffffff"],
        DistanceMetric::default(),
    )
    .unwrap();
    Quantizer::new(Arc::new(palette), DitherMode::None)
}

// ============================================================================
// Sinks et observateur enregistreurs
// ============================================================================

/// Image reçue et instant d'émission relatif à `origin`
#[derive(Debug, Clone)]
pub struct Emitted {
    pub index: u64,
    pub pts: Duration,
    pub at: Duration,
}

pub struct RecordingFrameSink {
    origin: Instant,
    pub emitted: Arc<Mutex<Vec<Emitted>>>,
    notify: mpsc::UnboundedSender<u64>,
}

impl RecordingFrameSink {
    pub fn new(origin: Instant) -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (notify, rx) = mpsc::unbounded_channel();
        (
            Self {
                origin,
                emitted: Arc::default(),
                notify,
            },
            rx,
        )
    }
}

impl FrameSink for RecordingFrameSink {
    fn on_frame(&mut self, frame: QuantizedFrame, palette: &Palette) {
        assert_eq!(frame.indices.len(), 16);
        assert!(frame.indices.iter().all(|&i| (i as usize) < palette.len()));
        self.emitted.lock().unwrap().push(Emitted {
            index: frame.index,
            pts: frame.pts,
            at: Instant::now() - self.origin,
        });
        let _ = self.notify.send(frame.index);
    }
}

pub struct RecordingAudioSink {
    origin: Instant,
    pub segments: Arc<Mutex<Vec<(Duration, Duration)>>>,
    notify: mpsc::UnboundedSender<Duration>,
}

impl RecordingAudioSink {
    pub fn new(origin: Instant) -> (Self, mpsc::UnboundedReceiver<Duration>) {
        let (notify, rx) = mpsc::unbounded_channel();
        (
            Self {
                origin,
                segments: Arc::default(),
                notify,
            },
            rx,
        )
    }
}

impl AudioSink for RecordingAudioSink {
    fn on_segment(&mut self, segment: AudioSegment) {
        self.segments
            .lock()
            .unwrap()
            .push((segment.pts, Instant::now() - self.origin));
        let _ = self.notify.send(segment.pts);
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<(PlaybackState, PlaybackState)>>,
    pub dropped: AtomicU64,
    pub drop_reports: AtomicU64,
    pub finished: Mutex<Option<PlaybackStats>>,
    pub errors: Mutex<Vec<String>>,
}

impl PlaybackObserver for RecordingObserver {
    fn on_state_change(&self, from: PlaybackState, to: PlaybackState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn on_frames_dropped(&self, count: u64, _last_index: u64) {
        self.dropped.fetch_add(count, Ordering::SeqCst);
        self.drop_reports.fetch_add(1, Ordering::SeqCst);
    }

    fn on_finished(&self, stats: &PlaybackStats) {
        *self.finished.lock().unwrap() = Some(stats.clone());
    }

    fn on_error(&self, error: &PlayerError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
