//! Cache of dub packages
//!
//! Dub packages are versioned but have no recipe revision, so their trees
//! live one level up from dop recipes: `<home>/dub-cache/<pkg>/<ver>/`.

use dop_types::Version;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DubCache {
    root: PathBuf,
}

impl DubCache {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn package_dir(&self, name: &str, version: &Version) -> PathBuf {
        self.root.join(name).join(version.to_string())
    }

    #[must_use]
    pub fn has_package(&self, name: &str, version: &Version) -> bool {
        self.package_dir(name, version).is_dir()
    }

    /// Versions of `name` present in the cache, unsorted
    #[must_use]
    pub fn cached_versions(&self, name: &str) -> Vec<Version> {
        std::fs::read_dir(self.root.join(name))
            .into_iter()
            .flatten()
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|s| Version::parse(&s).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_from_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DubCache::new(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path().join("vibe-d/0.9.7")).unwrap();
        std::fs::create_dir_all(dir.path().join("vibe-d/0.10.0")).unwrap();
        std::fs::create_dir_all(dir.path().join("vibe-d/not-a-version")).unwrap();

        let mut versions = cache.cached_versions("vibe-d");
        versions.sort();
        assert_eq!(
            versions,
            vec![Version::new(0, 9, 7), Version::new(0, 10, 0)]
        );
        assert!(cache.has_package("vibe-d", &Version::new(0, 9, 7)));
        assert!(!cache.has_package("vibe-d", &Version::new(1, 0, 0)));
    }
}
