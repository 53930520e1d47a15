//! Recipe host error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RecipeError {
    #[error("failed to load recipe {path}: {message}")]
    LoadFailed { path: String, message: String },

    #[error("recipe hook `{hook}` failed: {message}")]
    HookFailed { hook: String, message: String },

    #[error("recipe hook `{hook}` returned an unexpected shape: {message}")]
    WrongShape { hook: String, message: String },

    #[error("recipe declares no `{field}`")]
    MissingField { field: String },

    #[error("light recipe must declare at least one dependency")]
    LightWithoutDeps,

    #[error("invalid recipe field `{field}`: {message}")]
    InvalidField { field: String, message: String },

    #[error("no recipe file in {dir}")]
    NoRecipeFile { dir: String },
}
