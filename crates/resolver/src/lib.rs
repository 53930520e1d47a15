#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency resolution for dopamine
//!
//! The resolver turns a root recipe plus a configuration into an immutable
//! graph with exactly one `(version, location)` per package. It works in
//! phases over an intermediate graph:
//!
//! 1. *prepare* - walk dependency declarations, collecting candidate
//!    versions per package from the system, the cache and the registry;
//! 2. *compat* - iteratively drop candidates no upstream package can live
//!    with;
//! 3. *resolve* - pick one candidate per package under the user's
//!    heuristic, then cascade option bindings down the chosen graph;
//! 4. *materialize* - freeze the picks into a [`DepGraph`].
//!
//! Nodes, packs and edges live in index-addressed arenas, so back edges
//! are plain index lists and the resolved graph serializes trivially.

mod dag;
mod heuristics;
mod ig;
mod lockfile;
mod service;
mod source;

pub use dag::{DepGraph, DgEdge, DgNode, EdgeId, NodeId};
pub use heuristics::{Heuristics, HeuristicMode, SystemPolicy};
pub use ig::resolve_with;
pub use lockfile::{from_json, load_lock, to_json, write_lock, LOCK_FILE, LOCK_VERSION};
pub use service::{DepService, DepServices};
pub use source::{
    DepSource, DopCacheSource, DopRegistrySource, DubCacheSource, DubRegistry, DubRegistrySource,
    SystemSource,
};

use dop_errors::Result;
use dop_profile::BuildConfig;
use dop_recipe::Recipe;

/// Resolve the dependency graph of `root`
///
/// # Errors
///
/// Returns `ResolveError::UnresolvedDep` when no version assignment can
/// satisfy every constraint, and surfaces source errors (`NoSuchPackage`,
/// registry failures, recipe failures) as-is.
pub async fn resolve(
    root: &Recipe,
    config: &BuildConfig,
    heuristics: &Heuristics,
    services: &mut DepServices,
) -> Result<DepGraph> {
    resolve_with(root, config, heuristics, services, true).await
}
