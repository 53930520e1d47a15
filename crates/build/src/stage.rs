//! Staging installed artifacts into a shared destination

use dop_errors::{BuildError, Error, Result};
use dop_recipe::Recipe;
use std::path::Path;

/// Stage one built package into `dest`
///
/// Recipes with a `stage` hook drive the copy themselves from inside
/// their install directory; everything else is a recursive copy-install.
/// Recipes with `stage: false` were built straight into the destination,
/// so only their `post_stage` hook (if any) runs.
///
/// # Errors
///
/// Surfaces hook failures and copy errors.
pub fn stage_package(recipe: &Recipe, install_dir: &Path, dest: &Path) -> Result<()> {
    let dest = absolutize(dest)?;

    if !recipe.meta().stage_false {
        if recipe.meta().has_stage_hook {
            recipe.set_cwd(install_dir);
            recipe.stage(&dest)?;
        } else {
            copy_tree(install_dir, &dest).map_err(|e| BuildError::StageFailed {
                dest: dest.display().to_string(),
                message: e.to_string(),
            })?;
        }
    }

    if recipe.meta().has_post_stage_hook {
        recipe.set_cwd(&dest);
        recipe.post_stage()?;
    }
    Ok(())
}

pub(crate) fn absolutize(path: &Path) -> Result<std::path::PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(Error::from)?;
    Ok(cwd.join(path))
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
