#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the dopamine package manager
//!
//! This crate provides fine-grained error types organized by domain.
//! Everything funnels into the root [`Error`] enum at crate boundaries.

pub mod build;
pub mod cache;
pub mod profile;
pub mod recipe;
pub mod registry;
pub mod resolve;
pub mod state;
pub mod version;

// Re-export all error types at the root
pub use build::BuildError;
pub use cache::CacheError;
pub use profile::ProfileError;
pub use recipe::RecipeError;
pub use registry::RegistryError;
pub use resolve::ResolveError;
pub use state::StateError;
pub use version::VersionError;

use thiserror::Error;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Error)]
pub enum Error {
    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("recipe error: {0}")]
    Recipe(#[from] RecipeError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<semver::Error> for Error {
    fn from(err: semver::Error) -> Self {
        Self::Version(VersionError::ParseError {
            message: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for dopamine operations
pub type Result<T> = std::result::Result<T, Error>;
