//! Erreurs du lecteur

use crate::state::PlaybackState;
use pxmdecode::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// Erreur de décodage en cours de lecture, terminale pour la session
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Cannot {action} a session that is {state}")]
    InvalidState {
        action: &'static str,
        state: PlaybackState,
    },

    #[error("Failed to spawn pipeline stage: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
