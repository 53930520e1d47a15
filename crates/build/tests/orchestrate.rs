//! End-to-end orchestration over on-disk recipes

use async_trait::async_trait;
use dop_build::{build, BuildRequest};
use dop_errors::{BuildError, Error, Result};
use dop_profile::{Arch, BuildConfig, BuildType, HostInfo, Os, Profile, ResolveConfig, Tool};
use dop_resolver::{resolve, DepGraph, DepService, DepServices, DepSource, Heuristics};
use dop_types::{DepKind, DepLocation, DepSpec, Version};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

struct MockSource {
    location: DepLocation,
    versions: HashMap<String, Vec<Version>>,
    deps: HashMap<(String, Version), Vec<DepSpec>>,
    scripts: HashMap<String, String>,
    recipes_root: PathBuf,
}

impl MockSource {
    fn new(location: DepLocation, recipes_root: &Path) -> Self {
        Self {
            location,
            versions: HashMap::new(),
            deps: HashMap::new(),
            scripts: HashMap::new(),
            recipes_root: recipes_root.to_path_buf(),
        }
    }

    fn package(mut self, name: &str, version: &str, deps: &[&str], script: &str) -> Self {
        let version = Version::parse(version).unwrap();
        self.versions
            .entry(name.to_string())
            .or_default()
            .push(version.clone());
        self.deps.insert(
            (name.to_string(), version.clone()),
            deps.iter()
                .map(|d| DepSpec::parse(d, DepKind::Dop).unwrap())
                .collect(),
        );
        self.scripts
            .insert(format!("{name}-{version}"), script.to_string());
        self
    }
}

#[async_trait]
impl DepSource for MockSource {
    fn location(&self) -> DepLocation {
        self.location
    }

    async fn avail_versions(&self, name: &str) -> Result<Vec<Version>> {
        Ok(self.versions.get(name).cloned().unwrap_or_default())
    }

    async fn has_package(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
    ) -> Result<bool> {
        Ok(self
            .versions
            .get(name)
            .is_some_and(|versions| versions.contains(version)))
    }

    async fn fetch_recipe(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
        _token: &CancellationToken,
    ) -> Result<PathBuf> {
        let key = format!("{name}-{version}");
        let dir = self.recipes_root.join(&key);
        let file = dir.join(dop_recipe::RECIPE_FILE);
        if !file.is_file() {
            let script = self
                .scripts
                .get(&key)
                .ok_or_else(|| Error::internal(format!("no recipe script for {key}")))?;
            std::fs::create_dir_all(&dir).map_err(Error::from)?;
            std::fs::write(&file, script).map_err(Error::from)?;
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
        Ok(self
            .deps
            .get(&(name.to_string(), version.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

fn profile() -> Profile {
    Profile::new(
        "default",
        HostInfo {
            arch: Arch::X86_64,
            os: Os::Linux,
        },
        BuildType::Release,
        vec![Tool::new("cc", "gcc", "13.1.0", "/usr/bin/gcc")],
    )
}

fn empty_services() -> DepServices {
    let token = CancellationToken::new();
    DepServices::new(
        DepService::new(None, None, None, token.clone()),
        DepService::new(None, None, None, token),
    )
}

async fn resolve_graph(root: &dop_recipe::Recipe, services: &mut DepServices) -> DepGraph {
    resolve(
        root,
        &BuildConfig::new(profile()),
        &Heuristics::default(),
        services,
    )
    .await
    .unwrap()
}

const ROOT_ONLY: &str = r#"
def recipe():
    return {"name": "app", "version": "1.0.0", "src": "."}

def build(dirs, config, deps):
    run_cmd(["touch", path(dirs["install"], "app-artifact")])
"#;

#[tokio::test]
async fn builds_a_single_package_and_reuses_it() {
    let root_dir = tempfile::tempdir().unwrap();
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), ROOT_ONLY).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = empty_services();
    let graph = resolve_graph(&root, &mut services).await;

    let request = BuildRequest::default();
    let outcome = build(&graph, &root, &profile(), &request, &mut services)
        .await
        .unwrap();
    assert!(outcome.root.install_dir.join("app-artifact").is_file());
    assert!(outcome.dep_infos.is_empty());

    // the config state file sits next to the install dir, keyed by build id
    let state_file = root_dir
        .path()
        .join(".dop")
        .join(format!("{}.json", outcome.root.build_id));
    let first_state = std::fs::read_to_string(&state_file).unwrap();

    // second run is a no-op: same build id, untouched state
    let again = build(&graph, &root, &profile(), &request, &mut services)
        .await
        .unwrap();
    assert_eq!(again.root.build_id, outcome.root.build_id);
    assert_eq!(std::fs::read_to_string(&state_file).unwrap(), first_state);
}

#[tokio::test]
async fn dependencies_are_built_first_and_threaded_through() {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    let root_script = r#"
def recipe():
    return {"name": "app", "version": "1.0.0", "src": "."}

def dependencies(config):
    return ["lib >=1.0.0"]

def build(dirs, config, deps):
    if "lib" not in deps:
        fail("lib missing from dep infos")
    run_cmd(["touch", path(dirs["install"], "app-artifact")])
"#;
    let lib_script = r#"
def recipe():
    return {"name": "lib", "version": "1.0.0", "src": "."}

def build(dirs, config, deps):
    run_cmd(["touch", path(dirs["install"], "lib-artifact")])
"#;
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), root_script).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let token = CancellationToken::new();
    let cache = MockSource::new(DepLocation::Cache, fixtures.path()).package(
        "lib",
        "1.0.0",
        &[],
        lib_script,
    );
    let mut services = DepServices::new(
        DepService::new(None, Some(Box::new(cache)), None, token.clone()),
        DepService::new(None, None, None, token),
    );

    let graph = resolve_graph(&root, &mut services).await;
    let outcome = build(
        &graph,
        &root,
        &profile(),
        &BuildRequest::default(),
        &mut services,
    )
    .await
    .unwrap();

    let lib_info = outcome.dep_infos.get("lib").expect("lib in dep infos");
    assert!(lib_info.install_dir.join("lib-artifact").is_file());
    assert!(outcome.root.install_dir.join("app-artifact").is_file());
}

#[tokio::test]
async fn staging_copies_installed_artifacts() {
    let root_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), ROOT_ONLY).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = empty_services();
    let graph = resolve_graph(&root, &mut services).await;

    let request = BuildRequest {
        stage_dest: Some(stage_dir.path().to_path_buf()),
        ..BuildRequest::default()
    };
    let outcome = build(&graph, &root, &profile(), &request, &mut services)
        .await
        .unwrap();

    // built into .dop, then copy-installed into the stage destination
    assert!(outcome.root.install_dir.starts_with(root_dir.path()));
    assert!(stage_dir.path().join("app-artifact").is_file());
}

#[tokio::test]
async fn stage_false_builds_straight_into_the_destination() {
    let root_dir = tempfile::tempdir().unwrap();
    let stage_dir = tempfile::tempdir().unwrap();
    let script = r#"
def recipe():
    return {"name": "tool", "version": "1.0.0", "src": ".", "stage": False}

def build(dirs, config, deps):
    run_cmd(["touch", path(dirs["install"], "tool-artifact")])
"#;
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), script).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = empty_services();
    let graph = resolve_graph(&root, &mut services).await;

    let request = BuildRequest {
        stage_dest: Some(stage_dir.path().to_path_buf()),
        ..BuildRequest::default()
    };
    let outcome = build(&graph, &root, &profile(), &request, &mut services)
        .await
        .unwrap();

    assert_eq!(outcome.root.install_dir, stage_dir.path());
    assert!(stage_dir.path().join("tool-artifact").is_file());
}

#[tokio::test]
async fn missing_tools_fail_before_building() {
    let root_dir = tempfile::tempdir().unwrap();
    let script = r#"
def recipe():
    return {"name": "app", "version": "1.0.0", "src": ".", "tools": ["dc"]}

def build(dirs, config, deps):
    pass
"#;
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), script).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = empty_services();
    let graph = resolve_graph(&root, &mut services).await;

    let bare_profile = Profile::new(
        "default",
        HostInfo {
            arch: Arch::X86_64,
            os: Os::Linux,
        },
        BuildType::Release,
        vec![],
    );
    let err = build(
        &graph,
        &root,
        &bare_profile,
        &BuildRequest::default(),
        &mut services,
    )
    .await
    .unwrap_err();
    match err {
        Error::Build(BuildError::MissingTools { tools }) => {
            assert_eq!(tools, vec!["dc".to_string()]);
        }
        other => panic!("expected MissingTools, got {other}"),
    }
}

#[tokio::test]
async fn cancellation_aborts_the_walk() {
    let root_dir = tempfile::tempdir().unwrap();
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), ROOT_ONLY).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = empty_services();
    let graph = resolve_graph(&root, &mut services).await;

    let token = CancellationToken::new();
    token.cancel();
    let request = BuildRequest {
        token,
        ..BuildRequest::default()
    };
    let err = build(&graph, &root, &profile(), &request, &mut services)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}
