//! Error taxonomy shared by every component boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Error returned by the directory, mirror, engine and gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Malformed identity, bad display name, unknown game type, negative numbers.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The addressed player (or score) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing or wrong write credential, or a fact the ledger did not confirm.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// A resubmission that clashes with an already applied one.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Storage is unreachable or overloaded. Safe to retry with backoff.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Broken invariant or backend fault. The message is logged, never returned to callers.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Machine-readable error kind carried in response envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    Conflict,
    Unavailable,
    Internal,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::InvalidInput(_) => ErrorKind::InvalidInput,
            IndexError::NotFound(_) => ErrorKind::NotFound,
            IndexError::Unauthorized(_) => ErrorKind::Unauthorized,
            IndexError::Conflict(_) => ErrorKind::Conflict,
            IndexError::Unavailable(_) => ErrorKind::Unavailable,
            IndexError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            IndexError::InvalidInput(_) => 400,
            IndexError::NotFound(_) => 404,
            IndexError::Unauthorized(_) => 401,
            IndexError::Conflict(_) => 409,
            IndexError::Unavailable(_) => 503,
            IndexError::Internal(_) => 500,
        }
    }

    /// Message safe to show a caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            IndexError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownPlayer(key) => {
                IndexError::NotFound(format!("player {} is not registered", key))
            }
            StoreError::SubmissionConflict {
                player,
                submission_id,
            } => IndexError::Conflict(format!(
                "submission {} for player {} was already recorded with different data",
                submission_id, player
            )),
            overflow @ StoreError::Overflow { .. } => IndexError::InvalidInput(overflow.to_string()),
            StoreError::Unavailable(msg) => IndexError::Unavailable(msg),
            StoreError::Backend(msg) => IndexError::Internal(msg),
        }
    }
}
