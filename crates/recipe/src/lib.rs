#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Starlark recipe hosting for dopamine
//!
//! A recipe is a `dopamine.star` file in a package directory. It declares
//! its metadata through a `recipe()` function returning a dict, and exposes
//! build behavior through top-level hook functions:
//!
//! ```python
//! def recipe():
//!     return {"name": "zlib", "version": "1.3.1", "tools": ["cc"]}
//!
//! def source():
//!     run_cmd(["curl", "-LO", "https://example.com/zlib.tar.gz"])
//!     return "zlib-1.3.1"
//!
//! def build(dirs, config, deps):
//!     run_cmd(["./configure", "--prefix=" + dirs["install"]])
//!     run_cmd(["make", "install"])
//! ```
//!
//! Each loaded [`Recipe`] evaluates its script into a frozen module behind
//! a shared handle; hooks run in a fresh evaluator per call, so recipes
//! never observe each other's state.

mod api;
mod hookdata;
mod pcfile;
mod recipe;
mod revision;

pub use hookdata::{BuildDirs, DepInfo};
pub use pcfile::PcFile;
pub use recipe::{Recipe, RecipeMeta, RecipeType};

use dop_errors::{Error, RecipeError};
use std::path::Path;

/// File name of a recipe inside its package directory
pub const RECIPE_FILE: &str = "dopamine.star";

/// True when `dir` contains a recipe file
#[must_use]
pub fn contains_recipe(dir: &Path) -> bool {
    dir.join(RECIPE_FILE).is_file()
}

/// Load the recipe contained in `dir`
///
/// # Errors
///
/// Returns a `RecipeError` if the directory has no recipe file, the script
/// fails to parse, or the declared metadata is invalid.
pub fn load_recipe(dir: &Path) -> Result<Recipe, Error> {
    if !contains_recipe(dir) {
        return Err(RecipeError::NoRecipeFile {
            dir: dir.display().to_string(),
        }
        .into());
    }
    Recipe::load(dir)
}
