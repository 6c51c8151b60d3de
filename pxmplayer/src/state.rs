//! États de lecture et horloge de session

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// État d'une session de lecture
///
/// ```text
/// Idle --start--> Playing <--pause/resume--> Paused
///   \                |                         |
///    `---------------+------stop/erreur--------+--> Stopped
/// ```
///
/// `Stopped` est terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horloge monotone de session, qui ne compte pas le temps passé en pause
#[derive(Debug, Clone)]
pub(crate) struct SessionClock {
    origin: Instant,
    paused_since: Option<Instant>,
    paused_total: Duration,
}

impl SessionClock {
    /// Horloge arrêtée à zéro
    pub(crate) fn idle(now: Instant) -> Self {
        Self {
            origin: now,
            paused_since: Some(now),
            paused_total: Duration::ZERO,
        }
    }

    pub(crate) fn started(now: Instant) -> Self {
        Self {
            origin: now,
            paused_since: None,
            paused_total: Duration::ZERO,
        }
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        let end = self.paused_since.unwrap_or(now);
        end.saturating_duration_since(self.origin)
            .saturating_sub(self.paused_total)
    }

    pub(crate) fn pause(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub(crate) fn resume(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }
}
