//! Dependency resolution error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("cannot resolve dependency {name}: {}", .requirements.join(", "))]
    UnresolvedDep {
        name: String,
        /// One entry per up-package, e.g. `"pkg-1.2.0 requires >=2.0.0"`
        requirements: Vec<String>,
    },

    #[error("preselected version {version} of {name} is not available")]
    PreselectedMissing { name: String, version: String },

    #[error("module {module} depends on unresolved meta-package {name}")]
    ModuleWithoutSuper { module: String, name: String },

    #[error("lock file is corrupt: {message}")]
    CorruptLock { message: String },

    #[error("unsupported lock file version {found} (supported: {supported})")]
    UnsupportedLockVersion { found: u32, supported: u32 },
}
