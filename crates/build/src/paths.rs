//! Per-recipe build layout

use crate::build_id::BuildId;
use std::path::{Path, PathBuf};

/// The `.dop/` sub-tree of one recipe directory, keyed by build id
#[derive(Debug, Clone)]
pub struct BuildPaths {
    pub recipe_dir: PathBuf,
    pub dop_dir: PathBuf,
    pub build_dir: PathBuf,
    pub install_dir: PathBuf,
    pub state_file: PathBuf,
    pub config_lock: PathBuf,
}

impl BuildPaths {
    #[must_use]
    pub fn new(recipe_dir: &Path, build_id: &BuildId) -> Self {
        let dop_dir = recipe_dir.join(".dop");
        Self {
            recipe_dir: recipe_dir.to_path_buf(),
            build_dir: dop_dir.join(format!("{build_id}-build")),
            install_dir: dop_dir.join(build_id.as_str()),
            state_file: dop_dir.join(format!("{build_id}.json")),
            config_lock: dop_dir.join(format!("{build_id}.lock")),
            dop_dir,
        }
    }

    /// The recipe-granularity lock file
    #[must_use]
    pub fn recipe_lock(recipe_dir: &Path) -> PathBuf {
        recipe_dir.join(".dop").join("lock")
    }

    /// The per-recipe state file (`{src_dir}`)
    #[must_use]
    pub fn recipe_state(recipe_dir: &Path) -> PathBuf {
        recipe_dir.join(".dop").join("state.json")
    }
}
