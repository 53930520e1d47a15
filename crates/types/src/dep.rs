//! Dependency specifications and package availability

use crate::{OptionSet, PackageName, VersionSpec};
use dop_errors::VersionError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Which ecosystem a dependency comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    /// A dopamine-native package with a recipe
    Dop,
    /// A dub package consumed from the dub registry
    Dub,
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dop => f.write_str("dop"),
            Self::Dub => f.write_str("dub"),
        }
    }
}

/// Where an available version of a package was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepLocation {
    /// Installed system-wide, discovered through pkg-config
    System,
    /// Present in the local package cache
    Cache,
    /// Advertised by the registry, not yet downloaded
    Network,
}

impl DepLocation {
    #[must_use]
    pub fn is_system(self) -> bool {
        matches!(self, Self::System)
    }

    #[must_use]
    pub fn is_cache(self) -> bool {
        matches!(self, Self::Cache)
    }

    #[must_use]
    pub fn is_network(self) -> bool {
        matches!(self, Self::Network)
    }
}

impl fmt::Display for DepLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Cache => f.write_str("cache"),
            Self::Network => f.write_str("network"),
        }
    }
}

/// One version of a package at one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailVersion {
    pub version: Version,
    pub location: DepLocation,
}

impl AvailVersion {
    #[must_use]
    pub fn new(version: Version, location: DepLocation) -> Self {
        Self { version, location }
    }
}

impl PartialOrd for AvailVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AvailVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.location.cmp(&other.location))
    }
}

impl fmt::Display for AvailVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.location)
    }
}

/// A dependency as declared by a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSpec {
    pub name: PackageName,
    pub spec: VersionSpec,
    pub kind: DepKind,
    #[serde(default, skip_serializing_if = "OptionSet::is_empty")]
    pub options: OptionSet,
}

impl DepSpec {
    #[must_use]
    pub fn new(name: PackageName, spec: VersionSpec, kind: DepKind) -> Self {
        Self {
            name,
            spec,
            kind,
            options: OptionSet::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: OptionSet) -> Self {
        self.options = options;
        self
    }

    /// Parse a `"name >=1.0.0 <2.0.0"` style declaration
    ///
    /// The name is the first whitespace-separated token; the rest is the
    /// version spec, defaulting to any.
    ///
    /// # Errors
    ///
    /// Returns an error when the name or the constraint part is invalid.
    pub fn parse(input: &str, kind: DepKind) -> Result<Self, VersionError> {
        let input = input.trim();
        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };
        let name = PackageName::new(name)?;
        let spec: VersionSpec = rest.parse()?;
        Ok(Self::new(name, spec, kind))
    }
}

impl fmt::Display for DepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn avail_version_ordering_is_version_first() {
        let mut avail = vec![
            AvailVersion::new(v("1.1.0"), DepLocation::Network),
            AvailVersion::new(v("1.0.0"), DepLocation::Network),
            AvailVersion::new(v("1.0.0"), DepLocation::System),
            AvailVersion::new(v("1.0.0"), DepLocation::Cache),
        ];
        avail.sort();
        assert_eq!(avail[0].location, DepLocation::System);
        assert_eq!(avail[1].location, DepLocation::Cache);
        assert_eq!(avail[2].location, DepLocation::Network);
        assert_eq!(avail[3].version, v("1.1.0"));
    }

    #[test]
    fn parse_with_spec() {
        let dep = DepSpec::parse("zlib >=1.2.0 <2.0.0", DepKind::Dop).unwrap();
        assert_eq!(dep.name.as_str(), "zlib");
        assert!(dep.spec.matches(&v("1.5.0")));
        assert!(!dep.spec.matches(&v("2.0.0")));
    }

    #[test]
    fn parse_bare_name_matches_any() {
        let dep = DepSpec::parse("zlib", DepKind::Dub).unwrap();
        assert!(dep.spec.is_any());
        assert_eq!(dep.kind, DepKind::Dub);
    }
}
