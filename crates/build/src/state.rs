//! Small JSON state files
//!
//! Writers go through a temp file and rename so concurrent readers never
//! observe a half-written state.

use chrono::{DateTime, Utc};
use dop_errors::{Error, Result, StateError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-recipe state: where the source landed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_dir: Option<PathBuf>,
}

/// Per-configuration state: when the last successful build finished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    pub build_time: DateTime<Utc>,
}

/// Read a state file; a missing file is the default state
///
/// # Errors
///
/// A present but unparseable file is a `StateError::InvalidState`.
pub fn read_state<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };
    serde_json::from_str(&content).map_err(|e| {
        StateError::InvalidState {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Read a state file that must exist and parse
///
/// # Errors
///
/// Missing and unparseable files are both errors.
pub fn read_state_required<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).map_err(|e| Error::io_with_path(&e, path))?;
    serde_json::from_str(&content).map_err(|e| {
        StateError::InvalidState {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Atomically write a state file
///
/// # Errors
///
/// Surfaces I/O and serialization errors.
pub fn write_state<T: Serialize>(path: &Path, state: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::internal(format!("state file {} has no parent", path.display()))
    })?;
    std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;

    let json = serde_json::to_string_pretty(state)?;
    let tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::io_with_path(&e, parent))?;
    std::fs::write(tmp.path(), json).map_err(|e| Error::io_with_path(&e, tmp.path()))?;
    tmp.persist(path).map_err(|e| Error::io_with_path(&e.error, path))?;
    Ok(())
}

/// Modification time, if the path exists
#[must_use]
pub fn mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
