//! Tracker error types.

use thiserror::Error;

use pulse_core::ValidationError;
use pulse_state::{ErrorKind, StateError};

/// Errors that can occur while processing an observation.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("invalid observation: {0}")]
    Validation(#[from] ValidationError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl TrackError {
    /// Store error classification, `None` for rejected input.
    pub fn state_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation(_) => None,
            Self::State(e) => Some(e.kind()),
        }
    }
}

pub type TrackResult<T> = Result<T, TrackError>;
