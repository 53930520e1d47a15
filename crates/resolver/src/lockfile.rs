//! Lock-file serialization of a resolved graph
//!
//! The lock file pins a resolution so later builds replay it. Format
//! version 1; readers reject anything else and re-validate every recorded
//! constraint against the recorded versions.

use crate::dag::{DepGraph, NodeId};
use dop_errors::{Error, ResolveError, Result};
use dop_profile::ResolveConfig;
use dop_types::{AvailVersion, DepKind, DepLocation, OptionSet, PackageName, Version, VersionSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Name of the lock file inside a recipe directory
pub const LOCK_FILE: &str = "dop.lock";

/// The format version this build reads and writes
pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LockDoc {
    #[serde(rename = "dopamine-lock-version")]
    version: u32,
    config: ResolveConfig,
    packages: Vec<LockPackage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockPackage {
    name: PackageName,
    provider: DepKind,
    version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    system: bool,
    #[serde(default, skip_serializing_if = "OptionSet::is_empty")]
    options: OptionSet,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    root: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<LockDep>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockDep {
    name: PackageName,
    provider: DepKind,
    spec: VersionSpec,
}

/// Serialize a resolved graph to lock-file JSON
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(graph: &DepGraph, config: &ResolveConfig) -> Result<String> {
    let root = graph.root();
    let packages = graph
        .traverse_top_down()
        .into_iter()
        .map(|id| {
            let node = graph.node(id);
            let dependencies = node
                .down_edges
                .iter()
                .map(|&e| {
                    let edge = graph.edge(e);
                    let down = graph.node(edge.down);
                    LockDep {
                        name: down.name.clone(),
                        provider: down.kind,
                        spec: edge.spec.clone(),
                    }
                })
                .collect();
            LockPackage {
                name: node.name.clone(),
                provider: node.kind,
                version: node.aver.version.clone(),
                revision: node.revision.clone(),
                system: node.aver.location.is_system(),
                options: node.options.clone(),
                root: root == Some(id),
                dependencies,
            }
        })
        .collect();

    let doc = LockDoc {
        version: LOCK_VERSION,
        config: config.clone(),
        packages,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Reconstruct a resolved graph from lock-file JSON
///
/// # Errors
///
/// Returns `ResolveError::UnsupportedLockVersion` for other format
/// versions and `ResolveError::CorruptLock` when the recorded constraints
/// do not hold against the recorded versions.
pub fn from_json(content: &str) -> Result<(DepGraph, ResolveConfig)> {
    let doc: LockDoc = serde_json::from_str(content).map_err(|e| ResolveError::CorruptLock {
        message: e.to_string(),
    })?;
    if doc.version != LOCK_VERSION {
        return Err(ResolveError::UnsupportedLockVersion {
            found: doc.version,
            supported: LOCK_VERSION,
        }
        .into());
    }

    let mut graph = DepGraph::new();
    let mut index: HashMap<(String, DepKind), NodeId> = HashMap::new();
    let mut root = None;

    for package in &doc.packages {
        let location = if package.system {
            DepLocation::System
        } else {
            DepLocation::Cache
        };
        let id = graph.add_node(
            package.name.clone(),
            package.provider,
            AvailVersion::new(package.version.clone(), location),
            package.revision.clone(),
            package.options.clone(),
            Vec::new(),
        );
        let key = (package.name.as_str().to_string(), package.provider);
        if index.insert(key, id).is_some() {
            return Err(corrupt(format!("duplicate package {}", package.name)));
        }
        if package.root {
            if root.is_some() {
                return Err(corrupt("more than one root package"));
            }
            root = Some(id);
        }
    }

    for package in &doc.packages {
        let up = index[&(package.name.as_str().to_string(), package.provider)];
        for dep in &package.dependencies {
            let Some(&down) = index.get(&(dep.name.as_str().to_string(), dep.provider)) else {
                return Err(corrupt(format!(
                    "{} depends on {} which is not in the lock",
                    package.name, dep.name
                )));
            };
            let down_version = &graph.node(down).aver.version;
            if !dep.spec.matches(down_version) {
                return Err(corrupt(format!(
                    "{} requires {} {} but the lock holds {down_version}",
                    package.name, dep.name, dep.spec
                )));
            }
            graph.add_edge(up, down, dep.spec.clone());
        }
    }

    let root = root.ok_or_else(|| corrupt("no root package"))?;
    graph.set_root(root);
    Ok((graph, doc.config))
}

fn corrupt(message: impl Into<String>) -> Error {
    ResolveError::CorruptLock {
        message: message.into(),
    }
    .into()
}

/// Write the lock file into a recipe directory
///
/// # Errors
///
/// Surfaces serialization and I/O errors.
pub fn write_lock(graph: &DepGraph, config: &ResolveConfig, recipe_dir: &Path) -> Result<()> {
    let path = recipe_dir.join(LOCK_FILE);
    let json = to_json(graph, config)?;
    std::fs::write(&path, json).map_err(|e| Error::io_with_path(&e, &path))?;
    Ok(())
}

/// Load the lock file of a recipe directory, if present
///
/// # Errors
///
/// Surfaces I/O and format errors; a missing file is `Ok(None)`.
pub fn load_lock(recipe_dir: &Path) -> Result<Option<(DepGraph, ResolveConfig)>> {
    let path = recipe_dir.join(LOCK_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io_with_path(&e, &path))?;
    from_json(&content).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dop_profile::{Arch, BuildType, HostInfo, Os};

    fn resolve_config() -> ResolveConfig {
        ResolveConfig {
            host: HostInfo {
                arch: Arch::X86_64,
                os: Os::Linux,
            },
            build_type: BuildType::Release,
            options: OptionSet::new(),
        }
    }

    fn sample_graph() -> DepGraph {
        let mut graph = DepGraph::new();
        let root = graph.add_node(
            PackageName::new("app").unwrap(),
            DepKind::Dop,
            AvailVersion::new(Version::new(1, 0, 0), DepLocation::Cache),
            Some("00112233445566aa".to_string()),
            OptionSet::new(),
            Vec::new(),
        );
        let mut zlib_options = OptionSet::new();
        zlib_options.set("shared", "true");
        let zlib = graph.add_node(
            PackageName::new("zlib").unwrap(),
            DepKind::Dop,
            AvailVersion::new(Version::new(1, 3, 1), DepLocation::Cache),
            Some("aabbccddeeff0011".to_string()),
            zlib_options,
            Vec::new(),
        );
        let ssl = graph.add_node(
            PackageName::new("openssl").unwrap(),
            DepKind::Dop,
            AvailVersion::new(Version::new(3, 0, 9), DepLocation::System),
            None,
            OptionSet::new(),
            Vec::new(),
        );
        graph.add_edge(root, zlib, ">=1.2.0 <2.0.0".parse().unwrap());
        graph.add_edge(root, ssl, ">=3.0.0".parse().unwrap());
        graph.add_edge(zlib, ssl, ">=1.1.0".parse().unwrap());
        graph.set_root(root);
        graph
    }

    #[test]
    fn round_trip_is_idempotent() {
        let graph = sample_graph();
        let config = resolve_config();
        let json = to_json(&graph, &config).unwrap();
        let (reloaded, reloaded_config) = from_json(&json).unwrap();
        assert_eq!(reloaded_config, config);
        let json_again = to_json(&reloaded, &reloaded_config).unwrap();
        assert_eq!(json, json_again);
    }

    #[test]
    fn reload_preserves_resolution() {
        let graph = sample_graph();
        let json = to_json(&graph, &resolve_config()).unwrap();
        let (reloaded, _) = from_json(&json).unwrap();

        assert_eq!(reloaded.node_count(), graph.node_count());
        let zlib = reloaded.node(reloaded.find("zlib", DepKind::Dop).unwrap());
        assert_eq!(zlib.aver.version, Version::new(1, 3, 1));
        assert_eq!(zlib.revision.as_deref(), Some("aabbccddeeff0011"));
        assert_eq!(zlib.options.get("shared"), Some("true"));
        let ssl = reloaded.node(reloaded.find("openssl", DepKind::Dop).unwrap());
        assert!(ssl.aver.location.is_system());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let graph = sample_graph();
        let json = to_json(&graph, &resolve_config()).unwrap();
        let bumped = json.replace(
            "\"dopamine-lock-version\": 1",
            "\"dopamine-lock-version\": 2",
        );
        let err = from_json(&bumped).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolve(ResolveError::UnsupportedLockVersion { found: 2, .. })
        ));
    }

    #[test]
    fn spec_mismatch_is_corrupt() {
        let graph = sample_graph();
        let json = to_json(&graph, &resolve_config()).unwrap();
        // claim a zlib version the recorded constraint cannot accept
        let broken = json.replace("\"version\": \"1.3.1\"", "\"version\": \"2.5.0\"");
        let err = from_json(&broken).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolve(ResolveError::CorruptLock { .. })
        ));
    }

    #[test]
    fn missing_root_is_corrupt() {
        let json = r#"{
            "dopamine-lock-version": 1,
            "config": { "host": { "arch": "x86_64", "os": "linux" }, "build-type": "release" },
            "packages": [
                { "name": "zlib", "provider": "dop", "version": "1.3.1" }
            ]
        }"#;
        assert!(from_json(json).is_err());
    }
}
