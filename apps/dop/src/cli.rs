//! Command-line definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dop", version, about = "Source and binary package manager")]
pub struct Cli {
    /// Recipe directory to operate on
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub path: PathBuf,

    /// Profile name under `<home>/profiles/`
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// More logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the dependency graph and write the lock file
    Resolve(ResolveArgs),
    /// Build the package and its dependencies
    Build(BuildArgs),
    /// Build and stage everything into a destination
    Stage(StageArgs),
    /// Inspect the active profile
    Profile(ProfileArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Preference {
    PreferSystem,
    #[default]
    PreferCache,
    PreferLocal,
    PickHighest,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Version choice policy
    #[arg(long, value_enum, default_value = "prefer-cache")]
    pub prefer: Preference,

    /// Never use system packages
    #[arg(long)]
    pub no_system: bool,

    /// Option binding, repeatable: `KEY=VALUE` or `pkg/KEY=VALUE`
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Stage destination; recipes with `stage: false` build directly here
    #[arg(long, value_name = "DIR")]
    pub stage: Option<PathBuf>,

    /// Give up on file locks after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_lock_wait: Option<u64>,
}

#[derive(Debug, Args)]
pub struct StageArgs {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Destination directory
    pub dest: PathBuf,

    /// Give up on file locks after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_lock_wait: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Print the profile's digest hash instead of its contents
    #[arg(long)]
    pub digest: bool,
}
