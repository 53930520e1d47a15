//! The dependency service façade
//!
//! A [`DepService`] unifies up to three sources behind one query interface
//! and memoizes loaded recipes for the lifetime of a resolution. Two
//! services coexist: one for dop packages (system, cache, network) and one
//! for dub packages (cache and network only; dub has no system source).

use crate::source::DepSource;
use dop_errors::{Error, RegistryError, Result};
use dop_profile::ResolveConfig;
use dop_recipe::Recipe;
use dop_types::{AvailVersion, DepKind, DepLocation, DepSpec, PackageName};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

pub struct DepService {
    system: Option<Box<dyn DepSource>>,
    cache: Option<Box<dyn DepSource>>,
    network: Option<Box<dyn DepSource>>,
    memo: HashMap<String, Recipe>,
    token: CancellationToken,
}

impl DepService {
    #[must_use]
    pub fn new(
        system: Option<Box<dyn DepSource>>,
        cache: Option<Box<dyn DepSource>>,
        network: Option<Box<dyn DepSource>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            system,
            cache,
            network,
            memo: HashMap::new(),
            token,
        }
    }

    fn source(&self, location: DepLocation) -> Option<&dyn DepSource> {
        let source = match location {
            DepLocation::System => &self.system,
            DepLocation::Cache => &self.cache,
            DepLocation::Network => &self.network,
        };
        source.as_deref()
    }

    /// All `(version, location)` pairs for `name`, merged over the sources,
    /// deduplicated and sorted
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NoSuchPackage` when no source knows the
    /// package.
    pub async fn pack_avail_versions(&self, name: &PackageName) -> Result<Vec<AvailVersion>> {
        let query = name.pkg_name();
        let mut avail = Vec::new();
        for source in [&self.system, &self.cache, &self.network]
            .into_iter()
            .flatten()
        {
            for version in source.avail_versions(query).await? {
                avail.push(AvailVersion::new(version, source.location()));
            }
        }
        avail.sort();
        avail.dedup();
        if avail.is_empty() {
            return Err(RegistryError::NoSuchPackage {
                name: query.to_string(),
            }
            .into());
        }
        Ok(avail)
    }

    /// The recipe of `name` at `aver`, loaded once per resolution
    ///
    /// Network requests are transparently promoted to the cache source when
    /// the cache already holds the exact package.
    ///
    /// # Errors
    ///
    /// Never valid for system locations; surfaces fetch and load errors.
    pub async fn pack_recipe(
        &mut self,
        name: &PackageName,
        aver: &AvailVersion,
        revision: Option<&str>,
    ) -> Result<Recipe> {
        let query = name.pkg_name().to_string();
        let key = format!(
            "{query}/{}/{}",
            aver.version,
            revision.unwrap_or_default()
        );
        if let Some(recipe) = self.memo.get(&key) {
            return Ok(recipe.clone());
        }

        let dir = self.pack_dir(name, aver, revision).await?;
        let recipe = dop_recipe::load_recipe(&dir)?;
        self.memo.insert(key, recipe.clone());
        Ok(recipe)
    }

    /// The local tree of `name` at `aver`, fetched if necessary, without
    /// loading a recipe
    ///
    /// # Errors
    ///
    /// Never valid for system locations; surfaces fetch errors.
    pub async fn pack_dir(
        &mut self,
        name: &PackageName,
        aver: &AvailVersion,
        revision: Option<&str>,
    ) -> Result<std::path::PathBuf> {
        debug_assert!(!aver.location.is_system());
        if aver.location.is_system() {
            return Err(Error::internal(format!(
                "package tree requested for system package {name}"
            )));
        }

        let query = name.pkg_name();
        let mut location = aver.location;
        if location.is_network() {
            if let Some(cache) = self.source(DepLocation::Cache) {
                if cache.has_package(query, &aver.version, revision).await? {
                    location = DepLocation::Cache;
                }
            }
        }
        let source = self
            .source(location)
            .ok_or_else(|| Error::internal(format!("no {location} source configured")))?;
        source
            .fetch_recipe(query, &aver.version, revision, &self.token)
            .await
    }

    /// Dependencies of `name` at `aver`
    ///
    /// Dub-style sources answer from metadata; dop packages are fetched and
    /// asked through their recipe's `dependencies` hook.
    ///
    /// # Errors
    ///
    /// Surfaces source and recipe errors.
    pub async fn pack_dependencies(
        &mut self,
        config: &ResolveConfig,
        name: &PackageName,
        aver: &AvailVersion,
    ) -> Result<Vec<DepSpec>> {
        if aver.location.is_system() {
            // system packages are leaves; their dependencies are assumed
            // installed alongside them
            return Ok(Vec::new());
        }
        let source = self
            .source(aver.location)
            .ok_or_else(|| Error::internal(format!("no {} source configured", aver.location)))?;
        if source.has_dep_dependencies() {
            return source
                .dependencies(config, name.as_str(), &aver.version)
                .await;
        }
        let recipe = self.pack_recipe(name, aver, None).await?;
        recipe.dependencies(config)
    }
}

/// The pair of services the resolver dispatches over by [`DepKind`]
pub struct DepServices {
    pub dop: DepService,
    pub dub: DepService,
}

impl DepServices {
    #[must_use]
    pub fn new(dop: DepService, dub: DepService) -> Self {
        Self { dop, dub }
    }

    pub(crate) fn for_kind(&mut self, kind: DepKind) -> &mut DepService {
        match kind {
            DepKind::Dop => &mut self.dop,
            DepKind::Dub => &mut self.dub,
        }
    }
}
