//! Build identities
//!
//! A build id names one binary build: same recipe, same configuration,
//! same direct dependencies - same id, on any host.

use dop_hash::Digester;
use dop_profile::BuildConfig;
use dop_types::{DepKind, PackageName, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-1 identifying one build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a dependent build needs to know about a built dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepBuildInfo {
    pub name: PackageName,
    pub kind: DepKind,
    pub version: Version,
    pub build_id: BuildId,
    pub install_dir: PathBuf,
}

/// Compute the build id of one package build
///
/// Feeds, in order: the recipe identity (name, kind, version, revision),
/// the configuration digest, the direct dependencies sorted by name and
/// kind, and - only when the recipe couples to its stage destination - the
/// absolute stage path. Dependency order as declared does not influence
/// the id.
#[must_use]
pub fn compute_build_id(
    name: &PackageName,
    kind: DepKind,
    version: &Version,
    revision: Option<&str>,
    config: &BuildConfig,
    deps: &[DepBuildInfo],
    stage_path: Option<&Path>,
) -> BuildId {
    let mut digester = Digester::new();
    digester.feed_field(name.as_str());
    digester.feed_field(kind.to_string());
    digester.feed_field(version.to_string());
    digester.feed_field(revision.unwrap_or_default());

    config.feed_digest(&mut digester);

    let mut sorted: Vec<&DepBuildInfo> = deps.iter().collect();
    sorted.sort_by(|a, b| (&a.name, a.kind).cmp(&(&b.name, b.kind)));
    for dep in sorted {
        digester.feed_field(dep.name.as_str());
        digester.feed_field(dep.kind.to_string());
        digester.feed_field(dep.build_id.as_str());
    }

    if let Some(stage) = stage_path {
        digester.feed_field(stage.display().to_string());
    }

    BuildId(digester.finish().to_hex())
}
