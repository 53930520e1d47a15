//! Build option sets with `pkg/`-qualified keys
//!
//! An option key is either bare (`"shared"`) and targets the package the set
//! is attached to, or qualified (`"zlib/shared"`) and targets a dependency
//! further down the graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An ordered map of option keys to string values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet(BTreeMap<String, String>);

impl OptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Deterministic iteration in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Options with unqualified keys: those targeting the attachment point
    #[must_use]
    pub fn for_root(&self) -> Self {
        let map = self
            .0
            .iter()
            .filter(|(k, _)| !k.contains('/'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self(map)
    }

    /// Options qualified with `pkg/`, rewritten without the prefix
    #[must_use]
    pub fn for_dependency(&self, pkg: &str) -> Self {
        let prefix = format!("{pkg}/");
        let map = self
            .0
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();
        Self(map)
    }

    /// Everything not targeting `pkg`, keys left untouched
    #[must_use]
    pub fn not_for(&self, pkg: &str) -> Self {
        let prefix = format!("{pkg}/");
        let map = self
            .0
            .iter()
            .filter(|(k, _)| !k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self(map)
    }

    /// Union `other` into `self`
    ///
    /// A key defined on both sides with different values keeps the existing
    /// binding and is appended to `conflicts`.
    pub fn merge_from(&mut self, other: &Self, conflicts: &mut Vec<String>) {
        for (key, value) in &other.0 {
            match self.0.get(key) {
                Some(existing) if existing != value => {
                    if !conflicts.contains(key) {
                        conflicts.push(key.clone());
                    }
                }
                Some(_) => {}
                None => {
                    self.0.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> OptionSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn for_root_keeps_unqualified_keys() {
        let opts = set(&[("shared", "true"), ("zlib/shared", "false")]);
        let root = opts.for_root();
        assert_eq!(root.len(), 1);
        assert_eq!(root.get("shared"), Some("true"));
    }

    #[test]
    fn for_dependency_strips_prefix() {
        let opts = set(&[("zlib/shared", "false"), ("zlib/opt", "3"), ("curl/tls", "on")]);
        let dep = opts.for_dependency("zlib");
        assert_eq!(dep.len(), 2);
        assert_eq!(dep.get("shared"), Some("false"));
        assert_eq!(dep.get("opt"), Some("3"));
    }

    #[test]
    fn not_for_is_the_complement() {
        let opts = set(&[("shared", "true"), ("zlib/shared", "false"), ("curl/tls", "on")]);
        let rest = opts.not_for("zlib");
        assert_eq!(rest.len(), 2);
        assert!(rest.contains("shared"));
        assert!(rest.contains("curl/tls"));
    }

    #[test]
    fn merge_detects_conflicts() {
        let mut opts = set(&[("shared", "true")]);
        let mut conflicts = Vec::new();
        opts.merge_from(&set(&[("shared", "false"), ("opt", "2")]), &mut conflicts);
        assert_eq!(conflicts, vec!["shared".to_string()]);
        // first binding wins
        assert_eq!(opts.get("shared"), Some("true"));
        assert_eq!(opts.get("opt"), Some("2"));
    }

    #[test]
    fn merge_same_value_is_not_a_conflict() {
        let mut opts = set(&[("shared", "true")]);
        let mut conflicts = Vec::new();
        opts.merge_from(&set(&[("shared", "true")]), &mut conflicts);
        assert!(conflicts.is_empty());
    }
}
