//! Build orchestration error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("build failed: {message}")]
    Failed { message: String },

    #[error("profile is missing tools required by the build: {}", .tools.join(", "))]
    MissingTools { tools: Vec<String> },

    #[error("dependency {name} of {package} has not been built")]
    MissingDepInfo { package: String, name: String },

    #[error("option `{key}` of {package} has conflicting definitions; pass an explicit value")]
    UnboundOption { package: String, key: String },

    #[error("source fetch failed for {package}: {message}")]
    SourceFailed { package: String, message: String },

    #[error("stage destination {dest} is not usable: {message}")]
    StageFailed { dest: String, message: String },
}
