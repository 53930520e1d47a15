//! Resolution scenarios over an in-memory package universe

use async_trait::async_trait;
use dop_errors::{Error, ResolveError, Result};
use dop_profile::{Arch, BuildConfig, BuildType, HostInfo, Os, Profile, ResolveConfig};
use dop_resolver::{
    resolve, DepGraph, DepService, DepServices, DepSource, Heuristics, HeuristicMode,
};
use dop_types::{DepKind, DepLocation, DepSpec, OptionSet, Version};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// One location's worth of packages, with per-version dependency metadata
struct MockSource {
    location: DepLocation,
    versions: HashMap<String, Vec<Version>>,
    deps: HashMap<(String, Version), Vec<DepSpec>>,
    recipes_root: PathBuf,
}

impl MockSource {
    fn new(location: DepLocation, recipes_root: &Path) -> Self {
        Self {
            location,
            versions: HashMap::new(),
            deps: HashMap::new(),
            recipes_root: recipes_root.to_path_buf(),
        }
    }

    fn package(self, name: &str, version: &str, deps: &[&str]) -> Self {
        let deps = deps
            .iter()
            .map(|d| DepSpec::parse(d, DepKind::Dop).unwrap())
            .collect();
        self.package_specs(name, version, deps)
    }

    fn package_specs(mut self, name: &str, version: &str, deps: Vec<DepSpec>) -> Self {
        let version = Version::parse(version).unwrap();
        self.versions
            .entry(name.to_string())
            .or_default()
            .push(version.clone());
        self.deps.insert((name.to_string(), version), deps);
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
        // materialize a minimal recipe tree on first use
        let dir = self.recipes_root.join(format!("{name}-{version}"));
        let file = dir.join(dop_recipe::RECIPE_FILE);
        if !file.is_file() {
            std::fs::create_dir_all(&dir).map_err(Error::from)?;
            let script = format!(
                "def recipe():\n    return {{\"name\": \"{name}\", \"version\": \"{version}\"}}\n\
                 \n\
                 def build(dirs, config, deps):\n    pass\n"
            );
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

fn build_config() -> BuildConfig {
    BuildConfig::new(Profile::new(
        "default",
        HostInfo {
            arch: Arch::X86_64,
            os: Os::Linux,
        },
        BuildType::Release,
        vec![],
    ))
}

fn write_root_recipe(dir: &Path, name: &str, version: &str, deps: &[&str]) {
    let dep_list = deps
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let script = format!(
        "def recipe():\n    return {{\"name\": \"{name}\", \"version\": \"{version}\"}}\n\
         \n\
         def build(dirs, config, deps):\n    pass\n\
         \n\
         def dependencies(config):\n    return [{dep_list}]\n"
    );
    std::fs::write(dir.join(dop_recipe::RECIPE_FILE), script).unwrap();
}

/// The reference universe of spec packages `a` through `e`
fn reference_services(fixtures: &Path) -> DepServices {
    let token = CancellationToken::new();
    let system = MockSource::new(DepLocation::System, fixtures)
        .package("a", "1.1.0", &[])
        .package("b", "0.0.3", &["a >=1.1.0"]);
    let cache = MockSource::new(DepLocation::Cache, fixtures)
        .package("a", "1.0.0", &[])
        .package("a", "1.1.0", &[])
        .package("b", "0.0.1", &["a >=1.0.0 <2.0.0"])
        .package("c", "1.0.0", &[])
        .package("d", "1.0.0", &["c =1.0.0"]);
    let network = MockSource::new(DepLocation::Network, fixtures)
        .package("a", "1.1.1", &[])
        .package("a", "2.0.0", &[])
        .package("b", "0.0.2", &[])
        .package("c", "2.0.0", &["a >=1.1.0"])
        .package("d", "1.1.0", &["c =2.0.0"]);

    let dop = DepService::new(
        Some(Box::new(system)),
        Some(Box::new(cache)),
        Some(Box::new(network)),
        token.clone(),
    );
    let dub = DepService::new(None, None, None, token);
    DepServices::new(dop, dub)
}

fn assert_pick(graph: &DepGraph, name: &str, version: &str, location: DepLocation) {
    let id = graph
        .find(name, DepKind::Dop)
        .unwrap_or_else(|| panic!("{name} not in graph"));
    let node = graph.node(id);
    assert_eq!(
        node.aver.version,
        Version::parse(version).unwrap(),
        "version of {name}"
    );
    assert_eq!(node.aver.location, location, "location of {name}");
}

fn assert_edges_hold(graph: &DepGraph) {
    for (_, edge) in graph.edges() {
        let down = graph.node(edge.down);
        assert!(
            edge.spec.matches(&down.aver.version),
            "edge into {} violates {}",
            down.name,
            edge.spec
        );
    }
}

async fn resolve_reference(mode: HeuristicMode) -> DepGraph {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    write_root_recipe(root_dir.path(), "e", "1.0.0", &["b >=0.0.1", "d >=1.1.0"]);
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = reference_services(fixtures.path());
    let heuristics = Heuristics {
        mode,
        ..Heuristics::default()
    };
    let graph = resolve(&root, &build_config(), &heuristics, &mut services)
        .await
        .unwrap();
    assert_edges_hold(&graph);
    graph
}

#[tokio::test]
async fn prefer_system_resolution() {
    let graph = resolve_reference(HeuristicMode::PreferSystem).await;
    assert_pick(&graph, "e", "1.0.0", DepLocation::Cache);
    assert_pick(&graph, "a", "1.1.0", DepLocation::System);
    assert_pick(&graph, "b", "0.0.3", DepLocation::System);
    assert_pick(&graph, "c", "2.0.0", DepLocation::Network);
    assert_pick(&graph, "d", "1.1.0", DepLocation::Network);
}

#[tokio::test]
async fn prefer_cache_resolution() {
    let graph = resolve_reference(HeuristicMode::PreferCache).await;
    assert_pick(&graph, "a", "1.1.0", DepLocation::Cache);
    assert_pick(&graph, "b", "0.0.1", DepLocation::Cache);
    assert_pick(&graph, "c", "2.0.0", DepLocation::Network);
    assert_pick(&graph, "d", "1.1.0", DepLocation::Network);
}

#[tokio::test]
async fn prefer_local_resolution() {
    let graph = resolve_reference(HeuristicMode::PreferLocal).await;
    assert_pick(&graph, "a", "1.1.0", DepLocation::Cache);
    assert_pick(&graph, "b", "0.0.3", DepLocation::System);
    assert_pick(&graph, "c", "2.0.0", DepLocation::Network);
    assert_pick(&graph, "d", "1.1.0", DepLocation::Network);
}

#[tokio::test]
async fn pick_highest_resolution() {
    let graph = resolve_reference(HeuristicMode::PickHighest).await;
    // b resolves from the system and carries no sub-dependencies, so
    // nothing pins a below 2.0.0
    assert_pick(&graph, "a", "2.0.0", DepLocation::Network);
    assert_pick(&graph, "b", "0.0.3", DepLocation::System);
    assert_pick(&graph, "c", "2.0.0", DepLocation::Network);
    assert_pick(&graph, "d", "1.1.0", DepLocation::Network);
}

#[tokio::test]
async fn pre_filter_is_only_an_optimization() {
    for mode in [
        HeuristicMode::PreferSystem,
        HeuristicMode::PreferCache,
        HeuristicMode::PreferLocal,
        HeuristicMode::PickHighest,
    ] {
        let root_dir = tempfile::tempdir().unwrap();
        let fixtures = tempfile::tempdir().unwrap();
        write_root_recipe(root_dir.path(), "e", "1.0.0", &["b >=0.0.1", "d >=1.1.0"]);
        let root = dop_recipe::load_recipe(root_dir.path()).unwrap();
        let heuristics = Heuristics {
            mode,
            ..Heuristics::default()
        };

        let mut services = reference_services(fixtures.path());
        let filtered = resolve(&root, &build_config(), &heuristics, &mut services)
            .await
            .unwrap();
        let mut services = reference_services(fixtures.path());
        let unfiltered =
            dop_resolver::resolve_with(&root, &build_config(), &heuristics, &mut services, false)
                .await
                .unwrap();

        for (_, node) in filtered.nodes() {
            let other = unfiltered
                .find(node.name.as_str(), node.kind)
                .expect("same package set");
            assert_eq!(unfiltered.node(other).aver, node.aver);
        }
        assert_eq!(filtered.node_count(), unfiltered.node_count());
    }
}

#[tokio::test]
async fn unresolvable_diamond_reports_both_sides() {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    write_root_recipe(root_dir.path(), "x", "1.0.0", &["a =1.0.0", "b >=0.1.0"]);
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let token = CancellationToken::new();
    let cache = MockSource::new(DepLocation::Cache, fixtures.path())
        .package("a", "1.0.0", &[])
        .package("a", "2.0.0", &[])
        .package("b", "0.1.0", &["a =2.0.0"]);
    let dop = DepService::new(None, Some(Box::new(cache)), None, token.clone());
    let mut services = DepServices::new(dop, DepService::new(None, None, None, token));

    let err = resolve(
        &root,
        &build_config(),
        &Heuristics::default(),
        &mut services,
    )
    .await
    .unwrap_err();
    match err {
        Error::Resolve(ResolveError::UnresolvedDep { name, requirements }) => {
            assert_eq!(name, "a");
            assert_eq!(requirements.len(), 2, "{requirements:?}");
        }
        other => panic!("expected UnresolvedDep, got {other}"),
    }
}

#[tokio::test]
async fn empty_dependency_list_is_a_single_node() {
    let root_dir = tempfile::tempdir().unwrap();
    write_root_recipe(root_dir.path(), "solo", "1.0.0", &[]);
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let token = CancellationToken::new();
    let dop = DepService::new(None, None, None, token.clone());
    let mut services = DepServices::new(dop, DepService::new(None, None, None, token));

    let graph = resolve(
        &root,
        &build_config(),
        &Heuristics::default(),
        &mut services,
    )
    .await
    .unwrap();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.traverse_bottom_up().len(), 1);
    assert_eq!(graph.traverse_top_down().len(), 1);
}

#[tokio::test]
async fn modules_of_one_meta_package_share_a_version() {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    write_root_recipe(
        root_dir.path(),
        "app",
        "1.0.0",
        &["vibe:http >=0.9.0", "vibe:core >=0.9.0"],
    );
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let token = CancellationToken::new();
    let cache = MockSource::new(DepLocation::Cache, fixtures.path())
        .package("vibe", "0.9.7", &[])
        .package("vibe", "0.9.9", &[]);
    let dop = DepService::new(None, Some(Box::new(cache)), None, token.clone());
    let mut services = DepServices::new(dop, DepService::new(None, None, None, token));

    let graph = resolve(
        &root,
        &build_config(),
        &Heuristics::default(),
        &mut services,
    )
    .await
    .unwrap();
    let http = graph.node(graph.find("vibe:http", DepKind::Dop).unwrap());
    let core = graph.node(graph.find("vibe:core", DepKind::Dop).unwrap());
    assert_eq!(http.aver.version, core.aver.version);
}

#[tokio::test]
async fn options_cascade_to_their_targets() {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    // root depends on libx with options for libx itself and for liby below it
    let script = r#"
def recipe():
    return {"name": "app", "version": "1.0.0"}

def build(dirs, config, deps):
    pass

def dependencies(config):
    return [{
        "name": "libx",
        "spec": ">=1.0.0",
        "options": {"shared": "true", "liby/mode": "fast"},
    }]
"#;
    std::fs::write(root_dir.path().join(dop_recipe::RECIPE_FILE), script).unwrap();
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let token = CancellationToken::new();
    let cache = MockSource::new(DepLocation::Cache, fixtures.path())
        .package("libx", "1.0.0", &["liby >=1.0.0"])
        .package("liby", "1.0.0", &[]);
    let dop = DepService::new(None, Some(Box::new(cache)), None, token.clone());
    let mut services = DepServices::new(dop, DepService::new(None, None, None, token));

    let mut caller = OptionSet::new();
    caller.set("libx/opt", "3");
    let config = build_config().with_options(caller);

    let graph = resolve(&root, &config, &Heuristics::default(), &mut services)
        .await
        .unwrap();

    let libx = graph.node(graph.find("libx", DepKind::Dop).unwrap());
    assert_eq!(libx.options.get("shared"), Some("true"));
    assert_eq!(libx.options.get("opt"), Some("3"));
    assert!(libx.option_conflicts.is_empty());

    let liby = graph.node(graph.find("liby", DepKind::Dop).unwrap());
    assert_eq!(liby.options.get("mode"), Some("fast"));
}

#[tokio::test]
async fn resolved_dop_nodes_carry_a_revision() {
    let graph = resolve_reference(HeuristicMode::PreferCache).await;
    for (_, node) in graph.nodes() {
        if node.aver.location.is_system() {
            assert!(node.revision.is_none());
        } else {
            assert!(node.revision.is_some(), "{} has no revision", node.name);
        }
    }
}

#[tokio::test]
async fn preselected_version_overrides_the_mode() {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    write_root_recipe(root_dir.path(), "e", "1.0.0", &["b >=0.0.1", "d >=1.1.0"]);
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    let mut services = reference_services(fixtures.path());
    let mut heuristics = Heuristics {
        mode: HeuristicMode::PickHighest,
        ..Heuristics::default()
    };
    heuristics
        .pre_selected
        .insert("a".to_string(), Version::new(1, 1, 0));

    let graph = resolve(&root, &build_config(), &heuristics, &mut services)
        .await
        .unwrap();
    // pick-highest would take 2.0.0; the preselection pins the cache copy
    assert_pick(&graph, "a", "1.1.0", DepLocation::Cache);
}

#[tokio::test]
async fn lock_file_round_trips_a_real_resolution() {
    let graph = resolve_reference(HeuristicMode::PreferSystem).await;
    let config = build_config().resolve_config();

    let json = dop_resolver::to_json(&graph, &config).unwrap();
    let (reloaded, reloaded_config) = dop_resolver::from_json(&json).unwrap();
    assert_eq!(reloaded_config, config);
    let json_again = dop_resolver::to_json(&reloaded, &reloaded_config).unwrap();
    assert_eq!(json, json_again);

    // the reload preserves picks, system markers and revisions
    for (_, node) in graph.nodes() {
        let other = reloaded.node(reloaded.find(node.name.as_str(), node.kind).unwrap());
        assert_eq!(other.aver.version, node.aver.version);
        assert_eq!(other.aver.location.is_system(), node.aver.location.is_system());
        assert_eq!(other.revision, node.revision);
    }
}

#[tokio::test]
async fn conflicting_option_bindings_are_recorded() {
    let root_dir = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    write_root_recipe(
        root_dir.path(),
        "app",
        "1.0.0",
        &["libx >=1.0.0", "liby >=1.0.0"],
    );
    let root = dop_recipe::load_recipe(root_dir.path()).unwrap();

    // libx and liby both pass an option to their shared libz dependency,
    // with different values
    let mut shared_on = OptionSet::new();
    shared_on.set("shared", "true");
    let mut shared_off = OptionSet::new();
    shared_off.set("shared", "false");

    let token = CancellationToken::new();
    let cache = MockSource::new(DepLocation::Cache, fixtures.path())
        .package_specs(
            "libx",
            "1.0.0",
            vec![DepSpec::parse("libz >=1.0.0", DepKind::Dop)
                .unwrap()
                .with_options(shared_on)],
        )
        .package_specs(
            "liby",
            "1.0.0",
            vec![DepSpec::parse("libz >=1.0.0", DepKind::Dop)
                .unwrap()
                .with_options(shared_off)],
        )
        .package("libz", "1.0.0", &[]);
    let dop = DepService::new(None, Some(Box::new(cache)), None, token.clone());
    let mut services = DepServices::new(dop, DepService::new(None, None, None, token));

    let graph = resolve(
        &root,
        &build_config(),
        &Heuristics::default(),
        &mut services,
    )
    .await
    .unwrap();

    let libz = graph.node(graph.find("libz", DepKind::Dop).unwrap());
    assert_eq!(libz.option_conflicts, vec!["shared".to_string()]);
    // one binding survives until the caller settles the conflict
    assert!(libz.options.contains("shared"));
}
