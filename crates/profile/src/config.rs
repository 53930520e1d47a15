//! Build and resolution configurations

use crate::profile::{BuildType, HostInfo, Profile};
use dop_hash::Digester;
use dop_types::OptionSet;
use serde::{Deserialize, Serialize};

/// Everything a build of one package depends on besides its recipe and its
/// dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub profile: Profile,
    /// Selected modules of a meta-package, `None` for the whole package
    pub modules: Option<Vec<String>>,
    pub options: OptionSet,
}

impl BuildConfig {
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            modules: None,
            options: OptionSet::new(),
        }
    }

    #[must_use]
    pub fn with_modules(mut self, modules: Vec<String>) -> Self {
        self.modules = Some(modules);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: OptionSet) -> Self {
        self.options = options;
        self
    }

    /// Feed the configuration's identity bytes into a digest
    ///
    /// Profile first, then sorted module names, then options in key order.
    pub fn feed_digest(&self, digester: &mut Digester) {
        self.profile.feed_digest(digester);
        if let Some(modules) = &self.modules {
            let mut sorted = modules.clone();
            sorted.sort();
            for module in &sorted {
                digester.feed_field(module);
            }
        }
        for (key, value) in self.options.iter() {
            digester.feed_field(key);
            digester.feed_field(value);
        }
    }

    /// Lowercase hex SHA-1 of the configuration's identity bytes
    #[must_use]
    pub fn digest_hash(&self) -> String {
        let mut digester = Digester::new();
        self.feed_digest(&mut digester);
        digester.finish().to_hex()
    }

    /// The projection handed to recipe `dependencies` hooks and embedded in
    /// the lock file
    #[must_use]
    pub fn resolve_config(&self) -> ResolveConfig {
        ResolveConfig {
            host: self.profile.host,
            build_type: self.profile.build_type,
            options: self.options.clone(),
        }
    }
}

/// The configuration slice that influences dependency resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConfig {
    pub host: HostInfo,
    #[serde(rename = "build-type")]
    pub build_type: BuildType,
    #[serde(default, skip_serializing_if = "OptionSet::is_empty")]
    pub options: OptionSet,
}
