//! Package cache error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("cached tree {path} is damaged: {message}")]
    Integrity { path: String, message: String },

    #[error("archive extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("could not determine the dopamine home directory")]
    NoHomeDir,

    #[error("not in cache: {name}-{version}")]
    NotCached { name: String, version: String },
}
