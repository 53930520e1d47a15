//! Struct-shaped arguments passed to recipe hooks
//!
//! Hooks receive plain Starlark dicts; these helpers allocate them on the
//! evaluation heap.

use dop_profile::{BuildConfig, ResolveConfig};
use serde::{Deserialize, Serialize};
use starlark::values::dict::AllocDict;
use starlark::values::list::AllocList;
use starlark::values::{Heap, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directories a `build` hook works with
#[derive(Debug, Clone)]
pub struct BuildDirs {
    /// The recipe directory
    pub root: PathBuf,
    /// Where the source was fetched or unpacked
    pub src: PathBuf,
    /// Scratch directory the hook runs in
    pub build: PathBuf,
    /// Installation destination (the stage destination for `stage = False`
    /// recipes)
    pub install: PathBuf,
}

/// Install metadata of one direct dependency, as seen by a `build` hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepInfo {
    pub install_dir: PathBuf,
}

impl DepInfo {
    #[must_use]
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

pub(crate) fn alloc_dirs<'v>(heap: &'v Heap, dirs: &BuildDirs) -> Value<'v> {
    heap.alloc(AllocDict([
        ("root", path_str(&dirs.root)),
        ("src", path_str(&dirs.src)),
        ("build", path_str(&dirs.build)),
        ("install", path_str(&dirs.install)),
    ]))
}

fn alloc_options<'v>(heap: &'v Heap, options: &dop_types::OptionSet) -> Value<'v> {
    let pairs: Vec<(String, String)> = options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    heap.alloc(AllocDict(pairs))
}

pub(crate) fn alloc_build_config<'v>(heap: &'v Heap, config: &BuildConfig) -> Value<'v> {
    let mut entries: Vec<(&str, Value<'v>)> = vec![
        ("arch", heap.alloc(config.profile.host.arch.as_str())),
        ("os", heap.alloc(config.profile.host.os.as_str())),
        ("build_type", heap.alloc(config.profile.build_type.as_str())),
        ("options", alloc_options(heap, &config.options)),
    ];
    if let Some(modules) = &config.modules {
        entries.push(("modules", heap.alloc(AllocList(modules.clone()))));
    }
    heap.alloc(AllocDict(entries))
}

pub(crate) fn alloc_resolve_config<'v>(heap: &'v Heap, config: &ResolveConfig) -> Value<'v> {
    let entries: Vec<(&str, Value<'v>)> = vec![
        ("arch", heap.alloc(config.host.arch.as_str())),
        ("os", heap.alloc(config.host.os.as_str())),
        ("build_type", heap.alloc(config.build_type.as_str())),
        ("options", alloc_options(heap, &config.options)),
    ];
    heap.alloc(AllocDict(entries))
}

pub(crate) fn alloc_dep_infos<'v>(
    heap: &'v Heap,
    deps: &BTreeMap<String, DepInfo>,
) -> Value<'v> {
    let entries: Vec<(String, Value<'v>)> = deps
        .iter()
        .map(|(name, info)| {
            let entry = heap.alloc(AllocDict([(
                "install_dir",
                path_str(&info.install_dir),
            )]));
            (name.clone(), entry)
        })
        .collect();
    heap.alloc(AllocDict(entries))
}
