//! Registry client error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("no such package: {name}")]
    NoSuchPackage { name: String },

    #[error("no such version for {name}: {version}")]
    NoSuchVersion { name: String, version: String },

    #[error("no such revision for {name}-{version}: {revision}")]
    NoSuchRevision {
        name: String,
        version: String,
        revision: String,
    },

    #[error("registry returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("could not reach registry {host}: {reason}")]
    ServerDown { host: String, reason: String },

    #[error("invalid registry response: {message}")]
    InvalidResponse { message: String },
}
