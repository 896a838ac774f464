use crate::types::{ParticipantId, WinnerId};
use thiserror::Error;

/// The OS entropy source could not be read. Draws must not fall back to a
/// weaker generator.
#[derive(Debug, Error)]
#[error("secure random source unavailable: {0}")]
pub struct EntropyError(pub String);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(String),
    #[error("store codec: {0}")]
    Codec(String),
    #[error("participant limit reached ({0})")]
    ParticipantLimit(usize),
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("no eligible participants")]
    NoEligibleParticipants,
    #[error("cannot select {requested} winners from {available} participants")]
    InsufficientParticipants { requested: usize, available: usize },
    #[error("winner count must be between 1 and {max}, got {requested}")]
    InvalidWinnerCount { requested: usize, max: usize },
    #[error("winner {0} not found")]
    WinnerNotFound(WinnerId),
    #[error("winner {0} is already invalid")]
    WinnerAlreadyInvalid(WinnerId),
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),
    #[error(transparent)]
    Entropy(#[from] EntropyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DrawError {
    /// Input errors leave all state untouched and can be corrected by the caller.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DrawError::NoEligibleParticipants
                | DrawError::InsufficientParticipants { .. }
                | DrawError::InvalidWinnerCount { .. }
                | DrawError::WinnerAlreadyInvalid(_)
        )
    }
}
