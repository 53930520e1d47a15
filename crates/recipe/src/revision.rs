//! Recipe revision computation
//!
//! The revision pins a recipe's contents: the SHA-1 over the recipe file and
//! every file named by `include()`, paths normalized and sorted, truncated
//! to its first 8 bytes. Two recipe trees share a revision iff they contain
//! the same file set with identical bytes.

use crate::recipe::Recipe;
use dop_errors::{Error, RecipeError};
use dop_hash::Digester;
use std::path::PathBuf;

pub(crate) fn compute(recipe: &Recipe) -> Result<String, Error> {
    let dir = recipe.dir();
    let mut files: Vec<PathBuf> = vec![recipe.file()];
    for rel in recipe.include()? {
        files.push(dir.join(rel));
    }

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let canonical = file.canonicalize().map_err(|e| RecipeError::InvalidField {
            field: "include".to_string(),
            message: format!("{}: {e}", file.display()),
        })?;
        let rel = canonical
            .strip_prefix(dir.canonicalize()?)
            .unwrap_or(&canonical)
            .to_path_buf();
        // forward slashes keep revisions portable across hosts
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push((key, canonical));
    }
    entries.sort();
    entries.dedup();

    let mut digester = Digester::new();
    for (key, path) in entries {
        let bytes = std::fs::read(&path).map_err(|e| Error::io_with_path(&e, &path))?;
        digester.feed_field(&key);
        digester.feed(&bytes);
    }
    Ok(digester.finish().to_short_hex())
}
