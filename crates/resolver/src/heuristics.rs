//! Version choice heuristics
//!
//! Once the compatible candidates of a package are known, one must win.
//! Every candidate gets a score from its location and its rank in the
//! sorted version list; the mode decides which of the two dominates.

use dop_errors::{Error, ResolveError, Result};
use dop_types::{AvailVersion, DepLocation, Version};
use std::collections::HashMap;

/// What to optimize for when several versions qualify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeuristicMode {
    /// Lean on system-installed packages
    PreferSystem,
    /// Lean on already-cached packages
    #[default]
    PreferCache,
    /// Anything local (system or cache) beats the network
    PreferLocal,
    /// Newest version wins regardless of where it lives
    PickHighest,
}

/// Whether system packages may participate at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemPolicy {
    #[default]
    Allow,
    Disallow,
    /// Only packages in `system_list` may come from the system
    AllowedList,
    /// Packages in `system_list` must not come from the system
    DisallowedList,
}

#[derive(Debug, Clone, Default)]
pub struct Heuristics {
    pub mode: HeuristicMode,
    pub system: SystemPolicy,
    pub system_list: Vec<String>,
    /// Hard overrides: the named package must resolve to this version
    pub pre_selected: HashMap<String, Version>,
}

impl Heuristics {
    /// May `aver` be considered as a candidate for `name`?
    #[must_use]
    pub fn allow(&self, name: &str, aver: &AvailVersion) -> bool {
        if !aver.location.is_system() {
            return true;
        }
        match self.system {
            SystemPolicy::Allow => true,
            SystemPolicy::Disallow => false,
            SystemPolicy::AllowedList => self.system_list.iter().any(|n| n == name),
            SystemPolicy::DisallowedList => !self.system_list.iter().any(|n| n == name),
        }
    }

    /// Choose one of `candidates` for `name`
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::PreselectedMissing` when a preselected
    /// version is not among the candidates.
    pub fn choose_version(&self, name: &str, candidates: &[AvailVersion]) -> Result<AvailVersion> {
        debug_assert!(!candidates.is_empty());
        let mut sorted = candidates.to_vec();
        sorted.sort();

        if let Some(wanted) = self.pre_selected.get(name) {
            // the cache copy if there is one, the network copy otherwise
            for location in [DepLocation::Cache, DepLocation::Network] {
                if let Some(hit) = sorted
                    .iter()
                    .find(|av| av.version == *wanted && av.location == location)
                {
                    return Ok(hit.clone());
                }
            }
            return Err(Error::Resolve(ResolveError::PreselectedMissing {
                name: name.to_string(),
                version: wanted.to_string(),
            }));
        }

        let n = u64::try_from(sorted.len()).unwrap_or(u64::MAX);
        let high = 10 * n;
        let mid = high / 2;
        let low = 1;
        let (system_score, cache_score, ver_bump) = match self.mode {
            HeuristicMode::PreferSystem => (high, mid, low),
            HeuristicMode::PreferCache => (mid, high, low),
            HeuristicMode::PreferLocal => (high, high + 1, low + 1),
            HeuristicMode::PickHighest => (low, mid, high),
        };

        let mut best: Option<(&AvailVersion, u64)> = None;
        let mut ver_index = 0u64;
        let mut last_version: Option<&Version> = None;
        for av in &sorted {
            if last_version != Some(&av.version) {
                ver_index += 1;
                last_version = Some(&av.version);
            }
            let location_score = match av.location {
                DepLocation::System => system_score,
                DepLocation::Cache => cache_score,
                DepLocation::Network => 0,
            };
            let score = location_score + ver_index * ver_bump;
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((av, score));
            }
        }
        best.map(|(av, _)| av.clone())
            .ok_or_else(|| Error::internal(format!("no candidate for {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn av(version: &str, location: DepLocation) -> AvailVersion {
        AvailVersion::new(Version::parse(version).unwrap(), location)
    }

    // the `a` pack of the reference graph: two locations of 1.1.0 plus
    // lower and higher versions
    fn candidates() -> Vec<AvailVersion> {
        vec![
            av("1.1.0", DepLocation::Cache),
            av("1.1.0", DepLocation::System),
            av("1.1.1", DepLocation::Network),
            av("2.0.0", DepLocation::Network),
        ]
    }

    #[test]
    fn prefer_system_picks_the_system_copy() {
        let heuristics = Heuristics {
            mode: HeuristicMode::PreferSystem,
            ..Heuristics::default()
        };
        let chosen = heuristics.choose_version("a", &candidates()).unwrap();
        assert_eq!(chosen, av("1.1.0", DepLocation::System));
    }

    #[test]
    fn prefer_cache_picks_the_cache_copy() {
        let heuristics = Heuristics {
            mode: HeuristicMode::PreferCache,
            ..Heuristics::default()
        };
        let chosen = heuristics.choose_version("a", &candidates()).unwrap();
        assert_eq!(chosen, av("1.1.0", DepLocation::Cache));
    }

    #[test]
    fn prefer_local_breaks_the_tie_towards_cache() {
        let heuristics = Heuristics {
            mode: HeuristicMode::PreferLocal,
            ..Heuristics::default()
        };
        let chosen = heuristics.choose_version("a", &candidates()).unwrap();
        assert_eq!(chosen, av("1.1.0", DepLocation::Cache));
    }

    #[test]
    fn pick_highest_goes_to_the_network() {
        let heuristics = Heuristics {
            mode: HeuristicMode::PickHighest,
            ..Heuristics::default()
        };
        let chosen = heuristics.choose_version("a", &candidates()).unwrap();
        assert_eq!(chosen, av("2.0.0", DepLocation::Network));
    }

    #[test]
    fn preselected_prefers_cache_then_network() {
        let mut heuristics = Heuristics::default();
        heuristics
            .pre_selected
            .insert("a".to_string(), Version::new(1, 1, 0));
        let chosen = heuristics.choose_version("a", &candidates()).unwrap();
        assert_eq!(chosen, av("1.1.0", DepLocation::Cache));

        heuristics
            .pre_selected
            .insert("a".to_string(), Version::new(1, 1, 1));
        let chosen = heuristics.choose_version("a", &candidates()).unwrap();
        assert_eq!(chosen, av("1.1.1", DepLocation::Network));

        heuristics
            .pre_selected
            .insert("a".to_string(), Version::new(9, 9, 9));
        assert!(heuristics.choose_version("a", &candidates()).is_err());
    }

    #[test]
    fn system_policy_filters() {
        let allow = Heuristics::default();
        assert!(allow.allow("a", &av("1.0.0", DepLocation::System)));

        let disallow = Heuristics {
            system: SystemPolicy::Disallow,
            ..Heuristics::default()
        };
        assert!(!disallow.allow("a", &av("1.0.0", DepLocation::System)));
        assert!(disallow.allow("a", &av("1.0.0", DepLocation::Cache)));

        let listed = Heuristics {
            system: SystemPolicy::AllowedList,
            system_list: vec!["zlib".to_string()],
            ..Heuristics::default()
        };
        assert!(listed.allow("zlib", &av("1.0.0", DepLocation::System)));
        assert!(!listed.allow("curl", &av("1.0.0", DepLocation::System)));

        let excluded = Heuristics {
            system: SystemPolicy::DisallowedList,
            system_list: vec!["zlib".to_string()],
            ..Heuristics::default()
        };
        assert!(!excluded.allow("zlib", &av("1.0.0", DepLocation::System)));
        assert!(excluded.allow("curl", &av("1.0.0", DepLocation::System)));
    }
}
