//! Error types surfaced by the uniqueness provider.

use crate::machine::MachineError;
use crate::snapshot::SnapshotError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type for provider operations.
pub type NotaryResult<T> = std::result::Result<T, NotaryError>;

/// Errors returned to callers of a [`UniquenessProvider`](crate::UniquenessProvider).
///
/// A conflict is not an error: it is reported through
/// [`CommitResult::Conflict`](crate::CommitResult::Conflict).
#[derive(Debug, Error)]
pub enum NotaryError {
    /// The durable store failed. The state is unchanged.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A snapshot could not be produced or installed.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The replica cannot serve requests right now (no quorum, no leader,
    /// or it is waiting for a fresh snapshot).
    #[error("Service unavailable: {reason}")]
    Unavailable {
        /// Why the request could not be served.
        reason: String,
    },

    /// The request did not complete within its deadline. The commit may or
    /// may not have been applied.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The request is malformed or not valid for the target.
    #[error("Request rejected: {reason}")]
    Rejected {
        /// Why the request was rejected.
        reason: String,
    },
}

impl NotaryError {
    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a rejected error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether the same request may succeed if retried later.
    ///
    /// Retrying a commit is safe: a retry of an already applied commit
    /// reports a conflict naming the same transaction id.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

impl From<MachineError> for NotaryError {
    fn from(e: MachineError) -> Self {
        match e {
            MachineError::Store(e) => Self::Storage(e),
            MachineError::NotAQuery(name) => {
                Self::rejected(format!("{name} mutates state and cannot run as a query"))
            }
            MachineError::ResyncRequired => {
                Self::unavailable("replica is waiting for a snapshot after a failed install")
            }
        }
    }
}

/// Errors from parsing textual identifiers.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// Not valid hexadecimal.
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Decoded to the wrong number of bytes.
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length found.
        actual: usize,
    },

    /// A state reference was not of the form `<txhash>:<index>`.
    #[error("Invalid state reference '{0}', expected <txhash>:<index>")]
    InvalidStateRef(String),
}
