//! The recipe package cache

use crate::extract::extract_tar_xz;
use crate::lock::LockFile;
use dop_errors::{CacheError, Error};
use dop_registry::Registry;
use dop_types::Version;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// A recipe tree materialized in the cache
#[derive(Debug, Clone)]
pub struct CachedRevision {
    pub name: String,
    pub version: Version,
    pub revision: String,
    pub dir: PathBuf,
}

/// Cache of downloaded recipe trees, keyed by `(name, version, revision)`
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazy sequence of per-package directories
    pub fn package_dirs(&self) -> impl Iterator<Item = PathBuf> {
        std::fs::read_dir(&self.root)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.path())
    }

    #[must_use]
    pub fn version_dir(&self, name: &str, version: &Version) -> PathBuf {
        self.root.join(name).join(version.to_string())
    }

    #[must_use]
    pub fn revision_dir(&self, name: &str, version: &Version, revision: &str) -> PathBuf {
        self.version_dir(name, version).join(revision)
    }

    #[must_use]
    pub fn revision_lock_path(&self, name: &str, version: &Version, revision: &str) -> PathBuf {
        self.version_dir(name, version)
            .join(format!("{revision}.lock"))
    }

    /// Versions of `name` present in the cache, unsorted
    #[must_use]
    pub fn cached_versions(&self, name: &str) -> Vec<Version> {
        sub_dir_names(&self.root.join(name))
            .iter()
            .filter_map(|s| Version::parse(s).ok())
            .collect()
    }

    /// Revisions of `name`-`version` present in the cache, unsorted
    #[must_use]
    pub fn cached_revisions(&self, name: &str, version: &Version) -> Vec<String> {
        sub_dir_names(&self.version_dir(name, version))
            .into_iter()
            .filter(|rev| dop_recipe::contains_recipe(&self.revision_dir(name, version, rev)))
            .collect()
    }

    /// True when the cache holds a valid recipe tree for the key
    #[must_use]
    pub fn has_recipe(&self, name: &str, version: &Version, revision: Option<&str>) -> bool {
        match revision {
            Some(rev) => dop_recipe::contains_recipe(&self.revision_dir(name, version, rev)),
            None => !self.cached_revisions(name, version).is_empty(),
        }
    }

    /// Download and extract a recipe archive, idempotently
    ///
    /// With `revision` unset, the registry decides which revision is latest.
    /// The revision lock is held exclusively for the duration of the
    /// extraction so concurrent processes do not interleave writes.
    ///
    /// # Errors
    ///
    /// Surfaces registry errors as-is; a tree that extracts without a
    /// recipe file is a `CacheError::Integrity` and is left on disk for
    /// inspection.
    pub async fn cache_recipe(
        &self,
        registry: &dyn Registry,
        name: &str,
        version: &Version,
        revision: Option<&str>,
        token: &CancellationToken,
    ) -> Result<CachedRevision, Error> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let payload = match revision {
            Some(rev) => {
                // fast path: already extracted and valid
                let dir = self.revision_dir(name, version, rev);
                if dop_recipe::contains_recipe(&dir) {
                    return Ok(CachedRevision {
                        name: name.to_string(),
                        version: version.clone(),
                        revision: rev.to_string(),
                        dir,
                    });
                }
                registry.get_recipe_revision(name, version, rev).await?
            }
            None => registry.get_latest_recipe_revision(name, version).await?,
        };

        let revision = payload.revision.clone();
        let dir = self.revision_dir(name, version, &revision);
        let lock_path = self.revision_lock_path(name, version, &revision);
        let _lock = LockFile::acquire_exclusive(&lock_path, None, token).await?;

        if !dop_recipe::contains_recipe(&dir) {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let archive = tempfile::NamedTempFile::new().map_err(|e| {
                CacheError::ExtractionFailed {
                    message: format!("creating temp file: {e}"),
                }
            })?;
            registry
                .download_archive(&payload.archive_name, archive.path())
                .await?;
            extract_tar_xz(archive.path(), &dir).await?;

            if !dop_recipe::contains_recipe(&dir) {
                return Err(CacheError::Integrity {
                    path: dir.display().to_string(),
                    message: "extracted archive contains no recipe file".to_string(),
                }
                .into());
            }
            tracing::debug!(name, %version, revision, "cached recipe");
        }

        Ok(CachedRevision {
            name: name.to_string(),
            version: version.clone(),
            revision,
            dir,
        })
    }
}

fn sub_dir_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}
