//! Package names, including `name:module` sub-modules of meta-packages

use dop_errors::VersionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A package name, optionally carrying a `:module` suffix
///
/// `"vibe:http"` names the `http` module of the `vibe` meta-package; all
/// modules of one meta-package resolve to the same version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Parse and validate a package name
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidName` for empty names, names with
    /// whitespace, or names with more than one `:` separator.
    pub fn new(name: impl Into<String>) -> Result<Self, VersionError> {
        let name = name.into();
        let invalid = || VersionError::InvalidName { input: name.clone() };

        if name.is_empty() || name.starts_with(':') || name.ends_with(':') {
            return Err(invalid());
        }
        if name.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        if name.matches(':').count() > 1 {
            return Err(invalid());
        }
        Ok(Self(name))
    }

    /// The full name, module suffix included
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The meta-package part, module suffix stripped
    #[must_use]
    pub fn pkg_name(&self) -> &str {
        match self.0.split_once(':') {
            Some((pkg, _)) => pkg,
            None => &self.0,
        }
    }

    /// The module part, if any
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, module)| module)
    }

    /// True when this names a sub-module of a meta-package
    #[must_use]
    pub fn is_module(&self) -> bool {
        self.0.contains(':')
    }

    /// The name of the super-package (identity for plain names)
    #[must_use]
    pub fn super_name(&self) -> Self {
        Self(self.pkg_name().to_string())
    }
}

impl FromStr for PackageName {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name() {
        let name = PackageName::new("zlib").unwrap();
        assert_eq!(name.pkg_name(), "zlib");
        assert_eq!(name.module(), None);
        assert!(!name.is_module());
    }

    #[test]
    fn module_name() {
        let name = PackageName::new("vibe:http").unwrap();
        assert_eq!(name.pkg_name(), "vibe");
        assert_eq!(name.module(), Some("http"));
        assert!(name.is_module());
        assert_eq!(name.super_name().as_str(), "vibe");
    }

    #[test]
    fn rejects_invalid() {
        assert!(PackageName::new("").is_err());
        assert!(PackageName::new(":http").is_err());
        assert!(PackageName::new("vibe:").is_err());
        assert!(PackageName::new("a:b:c").is_err());
        assert!(PackageName::new("has space").is_err());
    }
}
