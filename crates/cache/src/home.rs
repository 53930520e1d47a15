//! The user's dop home directory

use dop_errors::{CacheError, Error};
use std::path::{Path, PathBuf};

/// Root of all per-user dopamine state
#[derive(Debug, Clone)]
pub struct DopHome {
    root: PathBuf,
}

impl DopHome {
    /// Locate the home: `DOP_HOME` if set, the platform default otherwise
    /// (`~/.dopamine` on POSIX, `%LOCALAPPDATA%\Dopamine` on Windows)
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn detect() -> Result<Self, Error> {
        if let Ok(root) = std::env::var("DOP_HOME") {
            return Ok(Self::from_root(PathBuf::from(root)));
        }
        let root = if cfg!(windows) {
            dirs::data_local_dir().map(|dir| dir.join("Dopamine"))
        } else {
            dirs::home_dir().map(|dir| dir.join(".dopamine"))
        };
        root.map(Self::from_root).ok_or_else(|| CacheError::NoHomeDir.into())
    }

    #[must_use]
    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    #[must_use]
    pub fn dub_cache_dir(&self) -> PathBuf {
        self.root.join("dub-cache")
    }

    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    #[must_use]
    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.ini"))
    }

    #[must_use]
    pub fn login_file(&self) -> PathBuf {
        self.root.join("login.json")
    }
}
