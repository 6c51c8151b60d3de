//! Ordonnanceur de lecture
//!
//! Une session assemble le pipeline suivant:
//!
//! ```text
//! DecodeSession ─▶ [pxm-decode] ─▶ canal ─▶ [pxm-quantize] ─▶ canal ─▶ diffusion images ─▶ FrameSink
//!        └──── AudioTrack ─▶ [pxm-audio] ─▶ canal ─▶ diffusion audio ─▶ AudioSink
//! ```
//!
//! Les deux boucles de diffusion partagent une horloge de session qui
//! démarre à `start` et ne compte pas le temps passé en pause. Chaque
//! élément est émis quand l'horloge atteint son timestamp. Une image dont
//! le retard dépasse la limite est jetée et signalée à l'observateur; les
//! segments audio ne sont jamais jetés.

use crate::error::{PlayerError, Result};
use crate::sink::{AudioSink, FrameSink, PlaybackObserver, PlaybackStats, TracingObserver};
use crate::stages::{self, FrameResult};
use crate::state::{PlaybackState, SessionClock};
use parking_lot::Mutex;
use pxmcache::CacheHandle;
use pxmdecode::{AudioSegment, DecodeSession};
use pxmdither::{Palette, Quantizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Retard maximal, en intervalles d'image, avant de jeter une image
pub const DEFAULT_BACKLOG_THRESHOLD: u32 = 3;
/// Capacité des canaux d'images décodées et quantifiées
pub const DEFAULT_FRAME_QUEUE: usize = 16;
/// Capacité du canal de segments audio
pub const DEFAULT_AUDIO_QUEUE: usize = 32;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    pub backlog_threshold: u32,
    pub frame_queue: usize,
    pub audio_queue: usize,
    /// Remplace la limite calculée à partir du seuil
    pub max_lateness: Option<Duration>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: DEFAULT_BACKLOG_THRESHOLD,
            frame_queue: DEFAULT_FRAME_QUEUE,
            audio_queue: DEFAULT_AUDIO_QUEUE,
            max_lateness: None,
        }
    }
}

impl PlaybackConfig {
    pub fn backlog_threshold(mut self, frames: u32) -> Self {
        self.backlog_threshold = frames;
        self
    }

    pub fn max_lateness(mut self, limit: Duration) -> Self {
        self.max_lateness = Some(limit);
        self
    }

    /// Retard au-delà duquel une image est jetée
    ///
    /// `None` quand le flux n'a pas de cadence connue (image fixe) et
    /// qu'aucune limite explicite n'est fixée: rien n'est jeté.
    pub fn lateness_limit(&self, frame_interval: Option<Duration>) -> Option<Duration> {
        self.max_lateness
            .or_else(|| frame_interval.map(|interval| interval * self.backlog_threshold))
    }
}

/// Fabrique de sessions de lecture
#[derive(Debug, Clone, Default)]
pub struct PlaybackScheduler {
    config: PlaybackConfig,
}

impl PlaybackScheduler {
    pub fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Prépare une session à partir d'un flux décodé
    pub fn session(
        &self,
        decode: DecodeSession,
        quantizer: Quantizer,
        frame_sink: impl FrameSink,
    ) -> PlaybackSession {
        PlaybackSession {
            config: self.config,
            decode,
            quantizer,
            frame_sink: Box::new(frame_sink),
            audio_sink: None,
            observer: Arc::new(TracingObserver),
            cache_handle: None,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Session en cours d'assemblage
pub struct PlaybackSession {
    config: PlaybackConfig,
    decode: DecodeSession,
    quantizer: Quantizer,
    frame_sink: Box<dyn FrameSink>,
    audio_sink: Option<Box<dyn AudioSink>>,
    observer: Arc<dyn PlaybackObserver>,
    cache_handle: Option<CacheHandle>,
}

impl PlaybackSession {
    /// Sans sink audio, la piste audio est ignorée
    pub fn with_audio_sink(mut self, sink: impl AudioSink) -> Self {
        self.audio_sink = Some(Box::new(sink));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PlaybackObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Garde l'entrée de cache jusqu'à l'arrêt de la session
    pub fn with_cache_handle(mut self, handle: CacheHandle) -> Self {
        self.cache_handle = Some(handle);
        self
    }

    /// Session prête, dans l'état `Idle`
    pub fn prepare(self) -> PlaybackHandle {
        let lateness_limit = self
            .config
            .lateness_limit(self.decode.info().frame_interval());
        let palette = self.quantizer.palette().clone();
        let (state, _) = watch::channel(PlaybackState::Idle);
        let (done, _) = watch::channel(false);

        let shared = Shared {
            config: self.config,
            lateness_limit,
            palette,
            state,
            done,
            clock: Mutex::new(SessionClock::idle(Instant::now())),
            stats: Mutex::new(PlaybackStats::default()),
            token: CancellationToken::new(),
            observer: self.observer,
            pending: Mutex::new(Some(Pending {
                decode: self.decode,
                quantizer: self.quantizer,
                frame_sink: self.frame_sink,
                audio_sink: self.audio_sink,
            })),
            cache_handle: Mutex::new(self.cache_handle),
            error: Mutex::new(None),
        };

        PlaybackHandle {
            shared: Arc::new(shared),
        }
    }

    /// Prépare et démarre; doit être appelé depuis un runtime tokio
    pub fn play(self) -> Result<PlaybackHandle> {
        let handle = self.prepare();
        handle.start()?;
        Ok(handle)
    }
}

struct Pending {
    decode: DecodeSession,
    quantizer: Quantizer,
    frame_sink: Box<dyn FrameSink>,
    audio_sink: Option<Box<dyn AudioSink>>,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Pause,
    Resume,
    Stop,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Finished,
    Interrupted,
}

struct Shared {
    config: PlaybackConfig,
    lateness_limit: Option<Duration>,
    palette: Arc<Palette>,
    state: watch::Sender<PlaybackState>,
    done: watch::Sender<bool>,
    clock: Mutex<SessionClock>,
    stats: Mutex<PlaybackStats>,
    token: CancellationToken,
    observer: Arc<dyn PlaybackObserver>,
    pending: Mutex<Option<Pending>>,
    cache_handle: Mutex<Option<CacheHandle>>,
    error: Mutex<Option<PlayerError>>,
}

impl Shared {
    fn elapsed(&self) -> Duration {
        self.clock.lock().elapsed(Instant::now())
    }

    /// Applique une transition; `None` si l'arrêt était déjà effectif
    fn apply(&self, action: Action) -> Result<Option<(PlaybackState, PlaybackState)>> {
        let now = Instant::now();
        let mut outcome = Ok(None);

        self.state.send_if_modified(|state| {
            let from = *state;
            let to = match (action, from) {
                (Action::Start, PlaybackState::Idle) => PlaybackState::Playing,
                (Action::Pause, PlaybackState::Playing) => PlaybackState::Paused,
                (Action::Resume, PlaybackState::Paused) => PlaybackState::Playing,
                (Action::Stop, PlaybackState::Stopped) => return false,
                (Action::Stop, _) => PlaybackState::Stopped,
                _ => {
                    outcome = Err(PlayerError::InvalidState {
                        action: action.as_str(),
                        state: from,
                    });
                    return false;
                }
            };

            let mut clock = self.clock.lock();
            match (from, to) {
                (PlaybackState::Idle, PlaybackState::Playing) => *clock = SessionClock::started(now),
                (_, PlaybackState::Playing) => clock.resume(now),
                _ => clock.pause(now),
            }
            *state = to;
            outcome = Ok(Some((from, to)));
            true
        });

        let change = outcome?;
        if let Some((from, to)) = change {
            debug!(%from, %to, "Playback transition");
            self.observer.on_state_change(from, to);
        }
        Ok(change)
    }

    fn release(&self) {
        if let Some(handle) = self.cache_handle.lock().take() {
            debug!(key = %handle.key(), "Releasing cache entry");
        }
    }

    /// Arrêt demandé par l'hôte ou consécutif à une erreur
    fn stop(&self) -> Option<PlaybackState> {
        let change = self.apply(Action::Stop).ok().flatten();
        self.token.cancel();
        self.release();
        change.map(|(from, _)| from)
    }

    fn fail(&self, error: PlayerError) {
        warn!(error = %error, "Playback stopped on error");
        self.stop();
        self.observer.on_error(&error);
        *self.error.lock() = Some(error);
    }

    fn finish(&self) {
        if self.apply(Action::Stop).ok().flatten().is_some() {
            let stats = self.stats.lock().clone();
            info!(
                frames = stats.frames_emitted,
                dropped = stats.frames_dropped,
                segments = stats.segments_emitted,
                "Playback reached end of stream"
            );
            self.observer.on_finished(&stats);
        }
        self.token.cancel();
        self.release();
    }

    fn launch(self: &Arc<Self>, pending: Pending) -> std::io::Result<()> {
        let Pending {
            mut decode,
            quantizer,
            frame_sink,
            audio_sink,
        } = pending;

        let frame_queue = self.config.frame_queue.max(1);
        let audio_track = decode.audio();

        let (decoded_tx, decoded_rx) = mpsc::channel(frame_queue);
        let (frame_tx, frame_rx) = mpsc::channel(frame_queue);
        stages::spawn_decode(decode, decoded_tx, self.token.clone())?;
        stages::spawn_quantize(quantizer, decoded_rx, frame_tx, self.token.clone())?;

        let audio = match audio_sink {
            Some(sink) if !audio_track.is_empty() => {
                let (audio_tx, audio_rx) = mpsc::channel(self.config.audio_queue.max(1));
                stages::spawn_audio(audio_track, audio_tx, self.token.clone())?;
                Some((audio_rx, sink))
            }
            _ => None,
        };

        let frames = tokio::spawn(deliver_frames(self.clone(), frame_rx, frame_sink));
        let audio = audio.map(|(rx, sink)| tokio::spawn(deliver_audio(self.clone(), rx, sink)));
        tokio::spawn(supervise(self.clone(), frames, audio));
        Ok(())
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Contrôle d'une session de lecture
///
/// Les clones pilotent la même session. Abandonner tous les handles
/// n'arrête pas la lecture: appeler [`stop`](Self::stop).
#[derive(Clone)]
pub struct PlaybackHandle {
    shared: Arc<Shared>,
}

impl PlaybackHandle {
    /// `Idle` → `Playing`; lance les étages du pipeline
    pub fn start(&self) -> Result<()> {
        self.shared.apply(Action::Start)?;

        let Some(pending) = self.shared.pending.lock().take() else {
            return Err(PlayerError::InvalidState {
                action: "start",
                state: self.state(),
            });
        };

        info!(
            lateness_limit = ?self.shared.lateness_limit,
            colors = self.shared.palette.len(),
            "Playback started"
        );

        if let Err(e) = self.shared.launch(pending) {
            let error = PlayerError::Spawn(e);
            self.shared.stop();
            self.shared.observer.on_error(&error);
            self.shared.done.send_replace(true);
            return Err(error);
        }
        Ok(())
    }

    /// `Playing` → `Paused`; l'horloge de session s'arrête
    pub fn pause(&self) -> Result<()> {
        self.shared.apply(Action::Pause).map(|_| ())
    }

    /// `Paused` → `Playing`
    pub fn resume(&self) -> Result<()> {
        self.shared.apply(Action::Resume).map(|_| ())
    }

    /// Passe à `Stopped` depuis n'importe quel état; idempotent
    ///
    /// Les étages s'arrêtent au plus tard à leur prochain élément et
    /// l'entrée de cache est rendue.
    pub fn stop(&self) {
        if self.shared.stop() == Some(PlaybackState::Idle) {
            // Jamais démarrée: rien ne signalera la fin à notre place
            self.shared.pending.lock().take();
            self.shared.done.send_replace(true);
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.shared.state.borrow()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.shared.stats.lock().clone()
    }

    /// Temps de session écoulé, hors pauses
    pub fn position(&self) -> Duration {
        self.shared.elapsed()
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.shared.palette
    }

    /// Erreur terminale, prise une seule fois
    pub fn take_error(&self) -> Option<PlayerError> {
        self.shared.error.lock().take()
    }

    /// Attend l'arrêt complet de la session
    ///
    /// Une session jamais démarrée ne se termine qu'avec `stop`.
    pub async fn wait(&self) -> PlaybackStats {
        let mut done = self.shared.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
        self.stats()
    }
}

// ============================================================================
// Diffusion
// ============================================================================

/// Attend que l'horloge de session atteigne `target`
///
/// Retourne `false` si la session s'arrête entre-temps.
async fn wait_until(
    shared: &Shared,
    state: &mut watch::Receiver<PlaybackState>,
    target: Duration,
) -> bool {
    loop {
        let current = *state.borrow_and_update();
        match current {
            PlaybackState::Stopped => return false,
            PlaybackState::Idle | PlaybackState::Paused => {
                tokio::select! {
                    changed = state.changed() => {
                        if changed.is_err() {
                            return false;
                        }
                    }
                    _ = shared.token.cancelled() => return false,
                }
                continue;
            }
            PlaybackState::Playing => {}
        }

        let elapsed = shared.elapsed();
        if elapsed >= target {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep(target - elapsed) => {}
            changed = state.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            _ = shared.token.cancelled() => return false,
        }
    }
}

/// Images jetées consécutives, signalées en un seul appel
#[derive(Default)]
struct DropRun {
    count: u64,
    last_index: u64,
}

impl DropRun {
    fn push(&mut self, index: u64) {
        self.count += 1;
        self.last_index = index;
    }

    fn flush(&mut self, observer: &dyn PlaybackObserver) {
        if self.count > 0 {
            observer.on_frames_dropped(self.count, self.last_index);
            self.count = 0;
        }
    }
}

async fn deliver_frames(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<FrameResult>,
    mut sink: Box<dyn FrameSink>,
) -> Delivery {
    let mut state = shared.state.subscribe();
    let mut dropped = DropRun::default();

    let outcome = loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            _ = shared.token.cancelled() => break Delivery::Interrupted,
        };

        let frame = match item {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                dropped.flush(shared.observer.as_ref());
                shared.fail(PlayerError::Decode(e));
                break Delivery::Interrupted;
            }
            None if shared.token.is_cancelled() => break Delivery::Interrupted,
            None => break Delivery::Finished,
        };

        if !wait_until(&shared, &mut state, frame.pts).await {
            break Delivery::Interrupted;
        }

        let lateness = shared.elapsed().saturating_sub(frame.pts);
        if shared.lateness_limit.is_some_and(|limit| lateness > limit) {
            debug!(
                index = frame.index,
                lateness_ms = lateness.as_millis() as u64,
                "Dropping late frame"
            );
            dropped.push(frame.index);
            shared.stats.lock().frames_dropped += 1;
            continue;
        }

        dropped.flush(shared.observer.as_ref());
        let pts = frame.pts;
        sink.on_frame(frame, &shared.palette);

        let mut stats = shared.stats.lock();
        stats.frames_emitted += 1;
        stats.last_frame_pts = Some(pts);
    };

    dropped.flush(shared.observer.as_ref());
    outcome
}

async fn deliver_audio(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<AudioSegment>,
    mut sink: Box<dyn AudioSink>,
) -> Delivery {
    let mut state = shared.state.subscribe();

    loop {
        let segment = tokio::select! {
            segment = rx.recv() => segment,
            _ = shared.token.cancelled() => return Delivery::Interrupted,
        };

        let Some(segment) = segment else {
            if shared.token.is_cancelled() {
                return Delivery::Interrupted;
            }
            return Delivery::Finished;
        };

        // En retard ou non, le son est toujours livré
        if !wait_until(&shared, &mut state, segment.pts).await {
            return Delivery::Interrupted;
        }
        sink.on_segment(segment);
        shared.stats.lock().segments_emitted += 1;
    }
}

async fn supervise(
    shared: Arc<Shared>,
    frames: JoinHandle<Delivery>,
    audio: Option<JoinHandle<Delivery>>,
) {
    let mut finished = joined(frames.await);
    if let Some(audio) = audio {
        finished &= joined(audio.await);
    }

    if finished && !shared.token.is_cancelled() {
        shared.finish();
    } else {
        shared.stop();
    }
    shared.done.send_replace(true);
}

fn joined(result: std::result::Result<Delivery, tokio::task::JoinError>) -> bool {
    match result {
        Ok(delivery) => delivery == Delivery::Finished,
        Err(e) => {
            warn!(error = %e, "Delivery task failed");
            false
        }
    }
}
