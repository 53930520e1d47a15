//! Command implementations: wire the crates together, keep logic thin

use crate::cli::{BuildArgs, Cli, Preference, ProfileArgs, ResolveArgs, StageArgs};
use dop_build::BuildRequest;
use dop_cache::{DopHome, DubCache, PackageCache};
use dop_errors::{Error, Result};
use dop_profile::{BuildConfig, HostInfo, BuildType, Profile};
use dop_recipe::Recipe;
use dop_registry::HttpRegistry;
use dop_resolver::{
    load_lock, write_lock, DepGraph, DepService, DepServices, DopCacheSource, DopRegistrySource,
    DubCacheSource, Heuristics, HeuristicMode, SystemPolicy, SystemSource,
};
use dop_types::OptionSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Session {
    home: DopHome,
    profile: Profile,
    recipe: Recipe,
    recipe_dir: PathBuf,
}

fn open_session(cli: &Cli) -> Result<Session> {
    let home = DopHome::detect()?;
    let recipe_dir = cli
        .path
        .canonicalize()
        .map_err(|e| Error::io_with_path(&e, &cli.path))?;
    let recipe = dop_recipe::load_recipe(&recipe_dir)?;
    let profile = load_profile(&home, cli.profile.as_deref())?;
    Ok(Session {
        home,
        profile,
        recipe,
        recipe_dir,
    })
}

fn load_profile(home: &DopHome, name: Option<&str>) -> Result<Profile> {
    match name {
        Some(name) => {
            let path = home.profile_path(name);
            if !path.is_file() {
                return Err(dop_errors::ProfileError::NoSuchProfile {
                    name: name.to_string(),
                }
                .into());
            }
            Profile::load(&path)
        }
        None => {
            let path = home.profile_path("default");
            if path.is_file() {
                Profile::load(&path)
            } else {
                tracing::warn!("no default profile; using a bare profile without tools");
                Ok(Profile::new(
                    "default",
                    HostInfo::current(),
                    BuildType::Release,
                    vec![],
                ))
            }
        }
    }
}

fn make_services(home: &DopHome, token: &CancellationToken) -> Result<DepServices> {
    let registry = Arc::new(HttpRegistry::with_defaults()?);
    let cache = PackageCache::new(home.cache_dir());
    let dop = DepService::new(
        Some(Box::new(SystemSource)),
        Some(Box::new(DopCacheSource::new(cache.clone()))),
        Some(Box::new(DopRegistrySource::new(registry, cache))),
        token.clone(),
    );
    // dub has no system source; network access comes through the dub
    // registry client when one is configured
    let dub = DepService::new(
        None,
        Some(Box::new(DubCacheSource::new(DubCache::new(
            home.dub_cache_dir(),
        )))),
        None,
        token.clone(),
    );
    Ok(DepServices::new(dop, dub))
}

fn make_heuristics(args: &ResolveArgs) -> Heuristics {
    let mode = match args.prefer {
        Preference::PreferSystem => HeuristicMode::PreferSystem,
        Preference::PreferCache => HeuristicMode::PreferCache,
        Preference::PreferLocal => HeuristicMode::PreferLocal,
        Preference::PickHighest => HeuristicMode::PickHighest,
    };
    let system = if args.no_system {
        SystemPolicy::Disallow
    } else {
        SystemPolicy::Allow
    };
    Heuristics {
        mode,
        system,
        ..Heuristics::default()
    }
}

fn parse_options(args: &ResolveArgs) -> Result<OptionSet> {
    let mut options = OptionSet::new();
    for binding in &args.options {
        let Some((key, value)) = binding.split_once('=') else {
            return Err(Error::internal(format!(
                "option `{binding}` is not KEY=VALUE"
            )));
        };
        options.set(key, value);
    }
    Ok(options)
}

fn print_graph(graph: &DepGraph) {
    for id in graph.traverse_top_down() {
        let node = graph.node(id);
        let revision = node
            .revision
            .as_deref()
            .map(|r| format!(" [{r}]"))
            .unwrap_or_default();
        println!(
            "{} {} ({}){revision}",
            node.name, node.aver.version, node.aver.location
        );
    }
}

async fn resolve_fresh(
    session: &Session,
    args: &ResolveArgs,
    services: &mut DepServices,
) -> Result<(DepGraph, BuildConfig)> {
    let options = parse_options(args)?;
    let config = BuildConfig::new(session.profile.clone()).with_options(options);
    let heuristics = make_heuristics(args);
    let graph = dop_resolver::resolve(&session.recipe, &config, &heuristics, services).await?;
    write_lock(&graph, &config.resolve_config(), &session.recipe_dir)?;
    Ok((graph, config))
}

/// Reuse the lock file when it is newer than the recipe, resolve otherwise
async fn resolve_or_load(
    session: &Session,
    args: &ResolveArgs,
    services: &mut DepServices,
) -> Result<(DepGraph, BuildConfig)> {
    let lock_path = session.recipe_dir.join(dop_resolver::LOCK_FILE);
    let lock_mtime = std::fs::metadata(&lock_path).and_then(|m| m.modified()).ok();
    let recipe_mtime = std::fs::metadata(session.recipe.file())
        .and_then(|m| m.modified())
        .ok();
    let lock_fresh = matches!((lock_mtime, recipe_mtime), (Some(l), Some(r)) if l > r);

    if lock_fresh {
        if let Some((graph, _)) = load_lock(&session.recipe_dir)? {
            tracing::info!("using {}", dop_resolver::LOCK_FILE);
            let options = parse_options(args)?;
            let config = BuildConfig::new(session.profile.clone()).with_options(options);
            return Ok((graph, config));
        }
    }
    resolve_fresh(session, args, services).await
}

pub async fn resolve(cli: &Cli, args: &ResolveArgs) -> Result<()> {
    let session = open_session(cli)?;
    let token = CancellationToken::new();
    let mut services = make_services(&session.home, &token)?;
    let (graph, _) = resolve_fresh(&session, args, &mut services).await?;
    print_graph(&graph);
    println!("wrote {}", dop_resolver::LOCK_FILE);
    Ok(())
}

pub async fn build(cli: &Cli, args: &BuildArgs) -> Result<()> {
    let session = open_session(cli)?;
    let token = CancellationToken::new();
    let mut services = make_services(&session.home, &token)?;
    let (graph, config) = resolve_or_load(&session, &args.resolve, &mut services).await?;

    let request = BuildRequest {
        options: config.options.clone(),
        stage_dest: args.stage.clone(),
        max_lock_wait: args.max_lock_wait.map(Duration::from_secs),
        token,
    };
    let outcome = dop_build::build(
        &graph,
        &session.recipe,
        &session.profile,
        &request,
        &mut services,
    )
    .await?;
    println!(
        "{} {} installed in {}",
        outcome.root.name,
        outcome.root.version,
        outcome.root.install_dir.display()
    );
    Ok(())
}

pub async fn stage(cli: &Cli, args: &StageArgs) -> Result<()> {
    let build_args = BuildArgs {
        resolve: ResolveArgs {
            prefer: args.resolve.prefer,
            no_system: args.resolve.no_system,
            options: args.resolve.options.clone(),
        },
        stage: Some(args.dest.clone()),
        max_lock_wait: args.max_lock_wait,
    };
    build(cli, &build_args).await?;
    println!("staged into {}", args.dest.display());
    Ok(())
}

pub fn profile(cli: &Cli, args: &ProfileArgs) -> Result<()> {
    let home = DopHome::detect()?;
    let profile = load_profile(&home, cli.profile.as_deref())?;
    if args.digest {
        println!("{}", profile.digest_hash());
        return Ok(());
    }
    println!("profile {}", profile.name());
    println!("  host: {} {}", profile.host.arch, profile.host.os);
    println!("  build type: {}", profile.build_type);
    for tool in profile.tools() {
        println!(
            "  tool {}: {} {} at {}",
            tool.id, tool.name, tool.version, tool.path
        );
    }
    println!("  digest: {}", profile.digest_hash());
    Ok(())
}
