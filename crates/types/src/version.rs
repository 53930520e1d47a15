//! Version constraint parsing and matching
//!
//! A [`VersionSpec`] is a conjunction of simple comparisons:
//! - `=1.2.3` (a bare `1.2.3` means the same)
//! - `>=1.2.0 <2.0.0` - range, space or comma separated
//! - `>1.0.0`, `<=1.5.0`, `<2.0.0`

use dop_errors::VersionError;
use semver::Version;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a single constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A single version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: ConstraintOp,
    pub version: Version,
}

impl Constraint {
    /// Check if a version satisfies this constraint
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self.op {
            ConstraintOp::Eq => version == &self.version,
            ConstraintOp::Lt => version < &self.version,
            ConstraintOp::Le => version <= &self.version,
            ConstraintOp::Gt => version > &self.version,
            ConstraintOp::Ge => version >= &self.version,
        }
    }

    fn parse(s: &str) -> Result<Self, VersionError> {
        let (op, rest) = if let Some(rest) = s.strip_prefix(">=") {
            (ConstraintOp::Ge, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (ConstraintOp::Le, rest)
        } else if let Some(rest) = s.strip_prefix("==") {
            (ConstraintOp::Eq, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (ConstraintOp::Eq, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (ConstraintOp::Gt, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (ConstraintOp::Lt, rest)
        } else {
            // bare version means exact
            (ConstraintOp::Eq, s)
        };

        let version = Version::parse(rest.trim()).map_err(|e| VersionError::ParseError {
            message: format!("{s}: {e}"),
        })?;
        Ok(Self { op, version })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// A version specification: the conjunction of its constraints
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionSpec {
    constraints: Vec<Constraint>,
}

impl VersionSpec {
    /// The spec that matches any version
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// An exact-version spec
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self {
            constraints: vec![Constraint {
                op: ConstraintOp::Eq,
                version,
            }],
        }
    }

    /// Check if a version satisfies every constraint, in order
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.constraints.iter().all(|c| c.matches(version))
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// True when the spec carries no constraint at all
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl FromStr for VersionSpec {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::any());
        }

        let constraints = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(Constraint::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if constraints.is_empty() {
            return Err(VersionError::InvalidConstraint {
                input: s.to_string(),
            });
        }
        Ok(Self { constraints })
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return f.write_str("*");
        }
        let mut first = true;
        for c in &self.constraints {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn exact_constraint() {
        let spec: VersionSpec = "=1.2.3".parse().unwrap();
        assert!(spec.matches(&v("1.2.3")));
        assert!(!spec.matches(&v("1.2.4")));
    }

    #[test]
    fn bare_version_is_exact() {
        let spec: VersionSpec = "1.2.3".parse().unwrap();
        assert!(spec.matches(&v("1.2.3")));
        assert!(!spec.matches(&v("1.2.2")));
    }

    #[test]
    fn space_separated_range() {
        let spec: VersionSpec = ">=1.2.0 <2.0.0".parse().unwrap();
        assert!(!spec.matches(&v("1.1.9")));
        assert!(spec.matches(&v("1.2.0")));
        assert!(spec.matches(&v("1.9.9")));
        assert!(!spec.matches(&v("2.0.0")));
    }

    #[test]
    fn comma_separated_range() {
        let spec: VersionSpec = ">=1.2.0,<2.0.0".parse().unwrap();
        assert!(spec.matches(&v("1.5.0")));
        assert!(!spec.matches(&v("2.0.0")));
    }

    #[test]
    fn strict_bounds() {
        let spec: VersionSpec = ">1.0.0 <=1.5.0".parse().unwrap();
        assert!(!spec.matches(&v("1.0.0")));
        assert!(spec.matches(&v("1.0.1")));
        assert!(spec.matches(&v("1.5.0")));
        assert!(!spec.matches(&v("1.5.1")));
    }

    #[test]
    fn any_version() {
        let spec: VersionSpec = "*".parse().unwrap();
        assert!(spec.is_any());
        assert!(spec.matches(&v("0.0.1")));
        assert!(spec.matches(&v("999.999.999")));
    }

    #[test]
    fn prerelease_ordering() {
        let spec: VersionSpec = ">=1.0.0-alpha <1.0.0".parse().unwrap();
        assert!(spec.matches(&v("1.0.0-alpha.1")));
        assert!(spec.matches(&v("1.0.0-beta")));
        assert!(!spec.matches(&v("1.0.0")));
    }

    #[test]
    fn version_display_round_trips() {
        for s in [
            "1.2.3",
            "0.1.0-alpha.1",
            "2.0.0-rc.1+build.5",
            "10.20.30",
        ] {
            assert_eq!(Version::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!("~>nope".parse::<VersionSpec>().is_err());
        assert!(">= ".parse::<VersionSpec>().is_err());
    }

    #[test]
    fn display_round_trip() {
        for s in ["=1.2.3", ">=1.0.0 <2.0.0", "*", ">1.0.0 <=1.5.0"] {
            let spec: VersionSpec = s.parse().unwrap();
            let again: VersionSpec = spec.to_string().parse().unwrap();
            assert_eq!(spec, again);
        }
    }

    #[test]
    fn serde_as_string() {
        let spec: VersionSpec = ">=1.0.0 <2.0.0".parse().unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, "\">=1.0.0 <2.0.0\"");
        let back: VersionSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
