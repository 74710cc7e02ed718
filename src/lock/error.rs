use thiserror::Error;

/// Error type for per-key lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A thread panicked while holding the lock state or the lock table.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl From<LockError> for crate::error::IndexError {
    fn from(err: LockError) -> Self {
        crate::error::IndexError::Unavailable(err.to_string())
    }
}
