//! Points de sortie vers l'hôte
//!
//! L'hôte fournit un [`FrameSink`] (son moteur de rendu), éventuellement un
//! [`AudioSink`], et peut observer la session via [`PlaybackObserver`].
//! Les méthodes sont appelées depuis les tâches de diffusion du runtime:
//! elles doivent rendre la main rapidement.

use crate::error::PlayerError;
use crate::state::PlaybackState;
use pxmdecode::AudioSegment;
use pxmdither::{Palette, QuantizedFrame};
use std::time::Duration;
use tracing::{info, warn};

/// Reçoit chaque image quantifiée à son heure de présentation
pub trait FrameSink: Send + 'static {
    fn on_frame(&mut self, frame: QuantizedFrame, palette: &Palette);
}

/// Reçoit chaque segment audio à son heure de présentation
pub trait AudioSink: Send + 'static {
    fn on_segment(&mut self, segment: AudioSegment);
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn on_frame(&mut self, frame: QuantizedFrame, palette: &Palette) {
        (**self).on_frame(frame, palette)
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn on_segment(&mut self, segment: AudioSegment) {
        (**self).on_segment(segment)
    }
}

/// Compteurs d'une session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub segments_emitted: u64,
    /// Timestamp de la dernière image émise
    pub last_frame_pts: Option<Duration>,
}

/// Événements de session; toutes les méthodes ont une implémentation vide
pub trait PlaybackObserver: Send + Sync {
    fn on_state_change(&self, _from: PlaybackState, _to: PlaybackState) {}

    /// `count` images consécutives jetées, la dernière étant `last_index`
    fn on_frames_dropped(&self, _count: u64, _last_index: u64) {}

    /// Fin naturelle du flux
    fn on_finished(&self, _stats: &PlaybackStats) {}

    /// Erreur terminale; la session passe ensuite à `Stopped`
    fn on_error(&self, _error: &PlayerError) {}
}

/// Observateur qui se contente de journaliser
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PlaybackObserver for TracingObserver {
    fn on_state_change(&self, from: PlaybackState, to: PlaybackState) {
        info!(%from, %to, "Playback state changed");
    }

    fn on_frames_dropped(&self, count: u64, last_index: u64) {
        warn!(count, last_index, "Late frames dropped");
    }

    fn on_finished(&self, stats: &PlaybackStats) {
        info!(
            frames = stats.frames_emitted,
            dropped = stats.frames_dropped,
            segments = stats.segments_emitted,
            "Playback finished"
        );
    }

    fn on_error(&self, error: &PlayerError) {
        warn!(error = %error, "Playback failed");
    }
}
