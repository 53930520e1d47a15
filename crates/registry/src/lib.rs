#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Typed registry client for dopamine
//!
//! The registry stores recipe archives keyed by `(name, version, revision)`.
//! The core consumes it through the [`Registry`] trait so tests and tools
//! can substitute their own implementation; [`HttpRegistry`] is the real
//! one, speaking JSON over HTTP.

mod client;
mod models;

pub use client::{HttpRegistry, RegistryConfig};
pub use models::{PackagePayload, RecipeRef, RecipeRevisionPayload, VersionPayload};

use async_trait::async_trait;
use dop_errors::Result;
use dop_types::Version;
use std::path::Path;

/// Default registry location, overridable with `DOP_REGISTRY`
pub const DEFAULT_URL: &str = "https://registry.dopamine.build";

/// The registry URL for this process
#[must_use]
pub fn registry_url() -> String {
    std::env::var("DOP_REGISTRY").unwrap_or_else(|_| DEFAULT_URL.to_string())
}

/// Read access to a recipe registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// All versions of a package, each with its known recipe revisions
    async fn get_package(&self, name: &str) -> Result<PackagePayload>;

    /// The most recent recipe revision of `name`-`version`
    async fn get_latest_recipe_revision(
        &self,
        name: &str,
        version: &Version,
    ) -> Result<RecipeRevisionPayload>;

    /// A specific recipe revision of `name`-`version`
    async fn get_recipe_revision(
        &self,
        name: &str,
        version: &Version,
        revision: &str,
    ) -> Result<RecipeRevisionPayload>;

    /// Download a recipe archive to `out`
    async fn download_archive(&self, archive_name: &str, out: &Path) -> Result<()>;
}
