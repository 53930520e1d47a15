//! Advisory file locks
//!
//! Locks guard cross-process critical sections: cache extraction, recipe
//! directories, per-config builds. Acquisition blocks on a worker thread;
//! a cancellation token or an optional upper bound turns the wait into an
//! error instead.

use dop_errors::{Error, StateError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A held advisory lock; released on drop
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Acquire an exclusive lock, blocking until it is available
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` when the token fires first, and
    /// `StateError::LockTimeout` when `timeout` elapses first.
    pub async fn acquire_exclusive(
        path: &Path,
        timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<Self, Error> {
        Self::acquire(path, true, timeout, token).await
    }

    /// Acquire a shared lock, blocking until it is available
    ///
    /// # Errors
    ///
    /// Same failure modes as [`LockFile::acquire_exclusive`].
    pub async fn acquire_shared(
        path: &Path,
        timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<Self, Error> {
        Self::acquire(path, false, timeout, token).await
    }

    async fn acquire(
        path: &Path,
        exclusive: bool,
        timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<Self, Error> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io_with_path(&e, path))?;

        let immediate = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        match immediate {
            Ok(()) => {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                tracing::info!(path = %path.display(), "waiting for lock held by another process");
            }
            Err(e) => {
                return Err(StateError::LockFailed {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
                .into())
            }
        }

        let path_buf = path.to_path_buf();
        let blocking = tokio::task::spawn_blocking(move || {
            let result = if exclusive {
                FileExt::lock_exclusive(&file)
            } else {
                FileExt::lock_shared(&file)
            };
            result.map(|()| file)
        });

        let waited = async {
            match blocking.await {
                Ok(Ok(file)) => Ok(Self {
                    file,
                    path: path_buf.clone(),
                }),
                Ok(Err(e)) => Err(StateError::LockFailed {
                    path: path_buf.display().to_string(),
                    message: e.to_string(),
                }
                .into()),
                Err(e) => Err(Error::internal(format!("lock task failed: {e}"))),
            }
        };

        match timeout {
            Some(limit) => tokio::select! {
                result = waited => result,
                () = token.cancelled() => Err(Error::Cancelled),
                () = tokio::time::sleep(limit) => Err(StateError::LockTimeout {
                    path: path.display().to_string(),
                }
                .into()),
            },
            None => tokio::select! {
                result = waited => result,
                () = token.cancelled() => Err(Error::Cancelled),
            },
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
