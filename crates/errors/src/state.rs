//! State file and locking error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("timed out waiting for lock {path}")]
    LockTimeout { path: String },

    #[error("could not acquire lock {path}: {message}")]
    LockFailed { path: String, message: String },

    #[error("invalid state file {path}: {message}")]
    InvalidState { path: String, message: String },
}
