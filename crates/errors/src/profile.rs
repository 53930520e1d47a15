//! Profile file error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("invalid profile file {path}: {message}")]
    InvalidIni { path: String, message: String },

    #[error("profile {path} is missing [{section}] {key}")]
    MissingKey {
        path: String,
        section: String,
        key: String,
    },

    #[error("unknown architecture: {value}")]
    UnknownArch { value: String },

    #[error("unknown operating system: {value}")]
    UnknownOs { value: String },

    #[error("unknown build type: {value}")]
    UnknownBuildType { value: String },

    #[error("no such profile: {name}")]
    NoSuchProfile { name: String },
}
