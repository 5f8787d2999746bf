//! Error types for the Pulse state store.

use pulse_core::{EntityId, SnapshotId, Timestamp};
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid entity key: {0:?}")]
    InvalidKey(String),

    #[error("unknown entity key: {0}")]
    UnknownKey(String),

    #[error("unknown entity id: {0}")]
    UnknownEntity(EntityId),

    #[error(
        "stale chain head for entity {entity_id}: expected previous snapshot {expected:?}, found {actual:?}"
    )]
    StaleHead {
        entity_id: EntityId,
        expected: Option<SnapshotId>,
        actual: Option<SnapshotId>,
    },

    #[error(
        "out-of-order append for entity {entity_id}: capture time {captured_at} precedes head at {head_captured_at}"
    )]
    OutOfOrder {
        entity_id: EntityId,
        head_captured_at: Timestamp,
        captured_at: Timestamp,
    },

    #[error("corrupt chain: {0}")]
    Corrupt(String),
}

/// Coarse classification used by callers to decide what to do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O or encoding failure in the backing store. Propagated as-is.
    StorageUnavailable,
    /// Another writer moved the chain head first.
    Conflict,
    /// Caller bug or broken invariant. Not retried.
    InvariantViolation,
}

impl StateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open(_)
            | Self::Transaction(_)
            | Self::Table(_)
            | Self::Read(_)
            | Self::Write(_)
            | Self::Serialize(_)
            | Self::Deserialize(_) => ErrorKind::StorageUnavailable,
            Self::StaleHead { .. } => ErrorKind::Conflict,
            Self::InvalidKey(_)
            | Self::UnknownKey(_)
            | Self::UnknownEntity(_)
            | Self::OutOfOrder { .. }
            | Self::Corrupt(_) => ErrorKind::InvariantViolation,
        }
    }
}
