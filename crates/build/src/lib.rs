#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build orchestration for dopamine
//!
//! Walks a resolved graph bottom-up, reuses up-to-date artifacts, runs
//! recipe hooks for the rest, and threads dependency install metadata into
//! every build. All per-build artifacts live under the recipe directory's
//! `.dop/` tree, keyed by build id:
//!
//! ```text
//! <recipe>/.dop/lock               recipe lock
//! <recipe>/.dop/state.json         {src_dir}
//! <recipe>/.dop/<id>/              install root
//! <recipe>/.dop/<id>-build/        build scratch
//! <recipe>/.dop/<id>.lock          per-config lock
//! <recipe>/.dop/<id>.json          {build_time}
//! ```

mod build_id;
mod orchestrator;
mod paths;
mod stage;
mod state;

pub use build_id::{compute_build_id, BuildId, DepBuildInfo};
pub use orchestrator::{build, BuildOutcome, BuildRequest};
pub use paths::BuildPaths;
pub use stage::stage_package;
pub use state::{mtime, read_state, read_state_required, write_state, BuildState, RecipeState};
