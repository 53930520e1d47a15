//! Dependency sources
//!
//! A [`DepSource`] answers three questions for one location: which versions
//! of a package exist, where its recipe tree is, and - for ecosystems that
//! publish dependency metadata - what a package depends on without loading
//! a recipe.

use async_trait::async_trait;
use dop_cache::{pkg_config_version, DubCache, PackageCache};
use dop_errors::{Error, RegistryError, Result};
use dop_profile::ResolveConfig;
use dop_registry::Registry;
use dop_types::{DepKind, DepLocation, DepSpec, Version};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One provider of packages at one location
#[async_trait]
pub trait DepSource: Send + Sync {
    fn location(&self) -> DepLocation;

    /// Versions of `name` this source can provide, unsorted
    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>>;

    /// True when this source has the exact package
    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<bool>;

    /// Materialize the package tree locally and return its directory
    async fn fetch_recipe(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
        token: &CancellationToken,
    ) -> Result<PathBuf>;

    /// True when [`DepSource::dependencies`] answers from source metadata;
    /// false when dependencies come from the recipe's own hook
    fn has_dep_dependencies(&self) -> bool {
        false
    }

    /// Dependencies from source metadata
    async fn dependencies(
        &self,
        _config: &ResolveConfig,
        name: &str,
        _version: &Version,
    ) -> Result<Vec<DepSpec>> {
        Err(Error::internal(format!(
            "source has no dependency metadata for {name}"
        )))
    }
}

/// Packages installed system-wide, visible through pkg-config
pub struct SystemSource;

#[async_trait]
impl DepSource for SystemSource {
    fn location(&self) -> DepLocation {
        DepLocation::System
    }

    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>> {
        Ok(pkg_config_version(name).await.into_iter().collect())
    }

    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
    ) -> Result<bool> {
        Ok(pkg_config_version(name).await.as_ref() == Some(version))
    }

    async fn fetch_recipe(
        &self,
        name: &str,
        _version: &Version,
        _revision: Option<&str>,
        _token: &CancellationToken,
    ) -> Result<PathBuf> {
        Err(Error::internal(format!(
            "system package {name} has no recipe"
        )))
    }
}

/// Recipes already extracted in the local cache
pub struct DopCacheSource {
    cache: PackageCache,
}

impl DopCacheSource {
    #[must_use]
    pub fn new(cache: PackageCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl DepSource for DopCacheSource {
    fn location(&self) -> DepLocation {
        DepLocation::Cache
    }

    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>> {
        Ok(self.cache.cached_versions(name))
    }

    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<bool> {
        Ok(self.cache.has_recipe(name, version, revision))
    }

    async fn fetch_recipe(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
        _token: &CancellationToken,
    ) -> Result<PathBuf> {
        let revision = match revision {
            Some(rev) => rev.to_string(),
            None => self
                .cache
                .cached_revisions(name, version)
                .into_iter()
                .next()
                .ok_or_else(|| dop_errors::CacheError::NotCached {
                    name: name.to_string(),
                    version: version.to_string(),
                })?,
        };
        let dir = self.cache.revision_dir(name, version, &revision);
        if !dop_recipe::contains_recipe(&dir) {
            return Err(dop_errors::CacheError::NotCached {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        Ok(dir)
    }
}

/// Recipes advertised by the registry; fetching extracts into the cache
pub struct DopRegistrySource {
    registry: Arc<dyn Registry>,
    cache: PackageCache,
}

impl DopRegistrySource {
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, cache: PackageCache) -> Self {
        Self { registry, cache }
    }
}

#[async_trait]
impl DepSource for DopRegistrySource {
    fn location(&self) -> DepLocation {
        DepLocation::Network
    }

    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>> {
        match self.registry.get_package(name).await {
            Ok(payload) => Ok(payload.versions.into_iter().map(|v| v.version).collect()),
            Err(Error::Registry(RegistryError::NoSuchPackage { .. })) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<bool> {
        let result = match revision {
            Some(rev) => self.registry.get_recipe_revision(name, version, rev).await,
            None => self.registry.get_latest_recipe_revision(name, version).await,
        };
        match result {
            Ok(_) => Ok(true),
            Err(Error::Registry(
                RegistryError::NoSuchPackage { .. }
                | RegistryError::NoSuchVersion { .. }
                | RegistryError::NoSuchRevision { .. },
            )) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fetch_recipe(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        let cached = self
            .cache
            .cache_recipe(self.registry.as_ref(), name, version, revision, token)
            .await?;
        Ok(cached.dir)
    }
}

/// Read access to the dub registry, consumed as typed responses
#[async_trait]
pub trait DubRegistry: Send + Sync {
    async fn versions(&self, name: &str) -> Result<Vec<Version>>;

    /// Materialize a dub package into `dest`
    async fn fetch(&self, name: &str, version: &Version, dest: &std::path::Path) -> Result<()>;

    /// Dependencies from the registry's package metadata
    async fn dependencies(&self, name: &str, version: &Version) -> Result<Vec<DepSpec>>;
}

/// Dub packages already present in the local dub cache
pub struct DubCacheSource {
    cache: DubCache,
}

impl DubCacheSource {
    #[must_use]
    pub fn new(cache: DubCache) -> Self {
        Self { cache }
    }

    /// Dependencies from the package's `dub.json`, if present
    fn metadata_dependencies(&self, name: &str, version: &Version) -> Result<Vec<DepSpec>> {
        let path = self.cache.package_dir(name, version).join("dub.json");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::io_with_path(&e, &path))?;
        parse_dub_dependencies(&content)
    }
}

#[async_trait]
impl DepSource for DubCacheSource {
    fn location(&self) -> DepLocation {
        DepLocation::Cache
    }

    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>> {
        Ok(self.cache.cached_versions(name))
    }

    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
    ) -> Result<bool> {
        Ok(self.cache.has_package(name, version))
    }

    async fn fetch_recipe(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
        _token: &CancellationToken,
    ) -> Result<PathBuf> {
        let dir = self.cache.package_dir(name, version);
        if !dir.is_dir() {
            return Err(dop_errors::CacheError::NotCached {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        Ok(dir)
    }

    fn has_dep_dependencies(&self) -> bool {
        true
    }

    async fn dependencies(
        &self,
        _config: &ResolveConfig,
        name: &str,
        version: &Version,
    ) -> Result<Vec<DepSpec>> {
        self.metadata_dependencies(name, version)
    }
}

/// Dub packages served by the dub registry
pub struct DubRegistrySource {
    registry: Arc<dyn DubRegistry>,
    cache: DubCache,
}

impl DubRegistrySource {
    #[must_use]
    pub fn new(registry: Arc<dyn DubRegistry>, cache: DubCache) -> Self {
        Self { registry, cache }
    }
}

#[async_trait]
impl DepSource for DubRegistrySource {
    fn location(&self) -> DepLocation {
        DepLocation::Network
    }

    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>> {
        self.registry.versions(name).await
    }

    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
    ) -> Result<bool> {
        Ok(self.registry.versions(name).await?.contains(version))
    }

    async fn fetch_recipe(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let dir = self.cache.package_dir(name, version);
        if !dir.is_dir() {
            self.registry.fetch(name, version, &dir).await?;
        }
        Ok(dir)
    }

    fn has_dep_dependencies(&self) -> bool {
        true
    }

    async fn dependencies(
        &self,
        _config: &ResolveConfig,
        name: &str,
        version: &Version,
    ) -> Result<Vec<DepSpec>> {
        self.registry.dependencies(name, version).await
    }
}

/// Parse the `dependencies` table of a `dub.json`
fn parse_dub_dependencies(content: &str) -> Result<Vec<DepSpec>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let Some(table) = value.get("dependencies").and_then(|v| v.as_object()) else {
        return Ok(Vec::new());
    };
    let mut deps = Vec::new();
    for (name, spec) in table {
        let spec_str = match spec {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(o) => o
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or("*")
                .to_string(),
            _ => "*".to_string(),
        };
        // dub writes `~>1.2.3` for "compatible"; treat it as >=
        let spec_str = spec_str.replace("~>", ">=");
        deps.push(DepSpec::parse(&format!("{name} {spec_str}"), DepKind::Dub)?);
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dub_json_dependencies() {
        let json = r#"{
            "name": "app",
            "dependencies": {
                "vibe-d": "~>0.9.7",
                "mir": { "version": ">=1.0.0" }
            }
        }"#;
        let mut deps = parse_dub_dependencies(json).unwrap();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name.as_str(), "mir");
        assert_eq!(deps[1].name.as_str(), "vibe-d");
        assert!(deps[1].spec.matches(&Version::new(0, 9, 8)));
        assert!(deps.iter().all(|d| d.kind == DepKind::Dub));
    }

    #[test]
    fn dub_json_without_dependencies() {
        assert!(parse_dub_dependencies(r#"{"name": "app"}"#)
            .unwrap()
            .is_empty());
    }
}
