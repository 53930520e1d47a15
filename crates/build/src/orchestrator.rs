//! The build walk
//!
//! Builds every non-system node of a resolved graph bottom-up, the root
//! last. Each node either reuses an up-to-date artifact or runs its
//! recipe's hooks inside a per-configuration lock.

use crate::build_id::{compute_build_id, BuildId, DepBuildInfo};
use crate::paths::BuildPaths;
use crate::stage::{absolutize, stage_package};
use crate::state::{self, BuildState, RecipeState};
use chrono::{DateTime, Utc};
use dop_cache::LockFile;
use dop_errors::{BuildError, Error, Result};
use dop_profile::{BuildConfig, Profile};
use dop_recipe::{BuildDirs, DepInfo, Recipe};
use dop_resolver::{DepGraph, DepServices, NodeId};
use dop_types::{DepKind, OptionSet};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Caller-controlled knobs of one build run
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Caller-supplied options, `pkg/`-qualified keys included
    pub options: OptionSet,
    /// Stage everything into this directory after building
    pub stage_dest: Option<PathBuf>,
    /// Upper bound on lock waits; unbounded when absent
    pub max_lock_wait: Option<Duration>,
    pub token: CancellationToken,
}

impl Default for BuildRequest {
    fn default() -> Self {
        Self {
            options: OptionSet::new(),
            stage_dest: None,
            max_lock_wait: None,
            token: CancellationToken::new(),
        }
    }
}

/// What a finished build hands back to the caller
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub root: DepBuildInfo,
    /// Install metadata of the full transitive dependency closure
    pub dep_infos: BTreeMap<String, DepInfo>,
}

/// Build the resolved graph with `root` as the root recipe
///
/// # Errors
///
/// Fails fast on missing tools, unbound option conflicts, recipe hook
/// failures, lock timeouts and cancellation; a failed dependency is never
/// skipped.
pub async fn build(
    graph: &DepGraph,
    root: &Recipe,
    profile: &Profile,
    request: &BuildRequest,
    services: &mut DepServices,
) -> Result<BuildOutcome> {
    let root_id = graph
        .root()
        .ok_or_else(|| Error::internal("cannot build a graph without a root"))?;
    let order = graph.traverse_bottom_up();

    let mut recipe_lock = Some(
        LockFile::acquire_exclusive(
            &BuildPaths::recipe_lock(root.dir()),
            request.max_lock_wait,
            &request.token,
        )
        .await?,
    );

    // load every recipe up front and verify the profile carries the tools
    let mut recipes: Vec<Option<Recipe>> = vec![None; graph.node_count()];
    for &id in &order {
        let node = graph.node(id);
        if node.aver.location.is_system() || node.kind == DepKind::Dub {
            continue;
        }
        let recipe = if id == root_id {
            root.clone()
        } else {
            services
                .dop
                .pack_recipe(&node.name, &node.aver, node.revision.as_deref())
                .await?
        };
        recipes[id] = Some(recipe);
    }
    check_tools(&recipes, profile)?;

    let mut infos: Vec<Option<DepBuildInfo>> = vec![None; graph.node_count()];
    for &id in &order {
        if request.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let node = graph.node(id);
        if node.aver.location.is_system() {
            continue;
        }

        if node.kind == DepKind::Dub {
            // dub packages are consumed as source trees; the fetched tree
            // doubles as the install directory
            let dir = services
                .dub
                .pack_dir(&node.name, &node.aver, None)
                .await?;
            let config = BuildConfig::new(profile.subset(&[])).with_options(node.options.clone());
            let build_id = compute_build_id(
                &node.name,
                node.kind,
                &node.aver.version,
                None,
                &config,
                &[],
                None,
            );
            infos[id] = Some(DepBuildInfo {
                name: node.name.clone(),
                kind: node.kind,
                version: node.aver.version.clone(),
                build_id,
                install_dir: dir,
            });
            continue;
        }

        let recipe = recipes[id]
            .clone()
            .ok_or_else(|| Error::internal(format!("no recipe loaded for {}", node.name)))?;

        if id == root_id {
            // the recipe is no longer mutated from here on
            drop(recipe_lock.take());
        }

        let info = build_node(graph, id, root_id == id, &recipe, profile, request, &infos).await?;
        if let Some(dest) = &request.stage_dest {
            stage_package(&recipe, &info.install_dir, dest)?;
        }
        infos[id] = Some(info);
    }

    let mut dep_infos = BTreeMap::new();
    for dep_id in graph.collect_dependencies(root_id) {
        if let Some(info) = &infos[dep_id] {
            dep_infos.insert(
                info.name.as_str().to_string(),
                DepInfo::new(info.install_dir.clone()),
            );
        }
    }
    let root_info = infos[root_id]
        .clone()
        .ok_or_else(|| Error::internal("root was not built"))?;
    Ok(BuildOutcome {
        root: root_info,
        dep_infos,
    })
}

fn check_tools(recipes: &[Option<Recipe>], profile: &Profile) -> Result<()> {
    let mut required: Vec<String> = recipes
        .iter()
        .flatten()
        .flat_map(|r| r.meta().tools.iter().cloned())
        .collect();
    required.sort();
    required.dedup();
    let missing: Vec<String> = required
        .into_iter()
        .filter(|id| !profile.has_tool(id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BuildError::MissingTools { tools: missing }.into())
    }
}

#[allow(clippy::too_many_lines)]
async fn build_node(
    graph: &DepGraph,
    id: NodeId,
    is_root: bool,
    recipe: &Recipe,
    profile: &Profile,
    request: &BuildRequest,
    infos: &[Option<DepBuildInfo>],
) -> Result<DepBuildInfo> {
    let node = graph.node(id);
    let name = &node.name;
    let recipe_dir = recipe.dir().to_path_buf();

    let sub_profile = profile.subset(&recipe.meta().tools);
    let mut effective = request.options.for_dependency(name.pkg_name());
    let mut merge_conflicts = Vec::new();
    effective.merge_from(&node.options, &mut merge_conflicts);
    for key in &node.option_conflicts {
        if !effective.contains(key) {
            return Err(BuildError::UnboundOption {
                package: name.to_string(),
                key: key.clone(),
            }
            .into());
        }
    }
    let config = BuildConfig {
        profile: sub_profile,
        modules: None,
        options: effective,
    };

    let mut direct = Vec::new();
    for &e in &node.down_edges {
        let down = graph.edge(e).down;
        let down_node = graph.node(down);
        // system dependencies carry no build artifacts
        if down_node.aver.location.is_system() {
            continue;
        }
        match &infos[down] {
            Some(info) => direct.push(info.clone()),
            None => {
                return Err(BuildError::MissingDepInfo {
                    package: name.to_string(),
                    name: down_node.name.to_string(),
                }
                .into())
            }
        }
    }

    let stage_coupled = match (&request.stage_dest, recipe.meta().stage_false) {
        (Some(dest), true) => Some(absolutize(dest)?),
        _ => None,
    };
    let build_id: BuildId = compute_build_id(
        name,
        node.kind,
        &node.aver.version,
        node.revision.as_deref(),
        &config,
        &direct,
        stage_coupled.as_deref(),
    );
    let paths = BuildPaths::new(&recipe_dir, &build_id);

    if is_root {
        if let Ok(dump) = std::env::var("DOP_E2E_TEST_CONFIG") {
            let _ = std::fs::write(dump, config.digest_hash());
        }
    }

    let _config_lock =
        LockFile::acquire_exclusive(&paths.config_lock, request.max_lock_wait, &request.token)
            .await?;

    recipe.set_env(config.profile.env_vars());
    let recipe_mtime = state::mtime(&recipe.file());

    // source readiness: in-tree sources never consult the recipe state
    let src_dir = if let Some(in_tree) = &recipe.meta().in_tree_src {
        recipe_dir.join(in_tree)
    } else {
        let state_path = BuildPaths::recipe_state(&recipe_dir);
        let recipe_state: RecipeState = state::read_state(&state_path)?;
        let fresh = matches!(
            (state::mtime(&state_path), recipe_mtime),
            (Some(state), Some(recipe)) if state > recipe
        );
        match recipe_state.src_dir {
            Some(src) if fresh => recipe_dir.join(src),
            _ => {
                if request.token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                recipe.set_cwd(&recipe_dir);
                let src = recipe.source().map_err(|e| BuildError::SourceFailed {
                    package: name.to_string(),
                    message: e.to_string(),
                })?;
                state::write_state(
                    &state_path,
                    &RecipeState {
                        src_dir: Some(PathBuf::from(&src)),
                    },
                )?;
                recipe_dir.join(src)
            }
        }
    };

    let install_dir = match &stage_coupled {
        Some(stage) => stage.clone(),
        None => paths.install_dir.clone(),
    };

    let build_state: Option<BuildState> = state::read_state_required(&paths.state_file).ok();
    let up_to_date = install_dir.exists()
        && match (&build_state, recipe_mtime, state::mtime(&paths.state_file)) {
            (Some(bs), Some(recipe), Some(state)) => {
                recipe < state && DateTime::<Utc>::from(recipe) < bs.build_time
            }
            _ => false,
        };

    if up_to_date {
        tracing::info!(package = %name, build_id = %build_id, "Up-to-date");
    } else {
        tokio::fs::create_dir_all(&paths.build_dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &paths.build_dir))?;
        tokio::fs::create_dir_all(&install_dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &install_dir))?;

        let mut dep_map = BTreeMap::new();
        for dep_id in graph.collect_dependencies(id) {
            if let Some(info) = &infos[dep_id] {
                dep_map.insert(
                    info.name.as_str().to_string(),
                    DepInfo::new(info.install_dir.clone()),
                );
            }
        }

        if request.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::info!(package = %name, version = %node.aver.version, build_id = %build_id, "building");
        recipe.set_cwd(&paths.build_dir);
        let dirs = BuildDirs {
            root: recipe_dir.clone(),
            src: src_dir,
            build: paths.build_dir.clone(),
            install: install_dir.clone(),
        };
        recipe.build(&dirs, &config, &dep_map)?;
        crate::state::write_state(
            &paths.state_file,
            &BuildState {
                build_time: Utc::now(),
            },
        )?;
    }

    Ok(DepBuildInfo {
        name: name.clone(),
        kind: node.kind,
        version: node.aver.version.clone(),
        build_id,
        install_dir,
    })
}
