//! Semantic-version resolution for "latest" queries.
//!
//! Versions are compared by semver precedence (major, minor, patch, then
//! pre-release; build metadata is ignored). A version that does not parse is
//! compared as `0.0.0`.

use semver::Version;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use super::Module;

/// Version resolver - pure functions over module records.
pub struct VersionResolver;

impl VersionResolver {
    /// Parse a version string, falling back to `0.0.0` when it is not semver.
    pub fn parse(version: &str) -> Version {
        Version::parse(version).unwrap_or_else(|_| Version::new(0, 0, 0))
    }

    /// Compare two version strings by semver precedence.
    pub fn compare(a: &str, b: &str) -> Ordering {
        let a = Self::parse(a);
        let b = Self::parse(b);
        (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
    }

    /// Find the record with the greatest version.
    ///
    /// On equal precedence the first-seen record wins: a candidate only
    /// replaces the current best when it is strictly greater.
    pub fn latest(modules: &[Module]) -> Option<&Module> {
        modules.iter().fold(None, |best, candidate| match best {
            Some(current) if !Self::is_newer(candidate, current) => Some(current),
            _ => Some(candidate),
        })
    }

    /// Find the latest record for every distinct provider.
    ///
    /// The result is ordered by provider name.
    pub fn latest_per_provider(modules: &[Module]) -> Vec<&Module> {
        let mut latest: BTreeMap<&str, &Module> = BTreeMap::new();
        for module in modules {
            match latest.entry(module.provider.as_str()) {
                Entry::Vacant(entry) => {
                    entry.insert(module);
                }
                Entry::Occupied(mut entry) => {
                    if Self::is_newer(module, entry.get()) {
                        entry.insert(module);
                    }
                }
            }
        }
        latest.into_values().collect()
    }

    fn is_newer(candidate: &Module, current: &Module) -> bool {
        Self::compare(&candidate.version, &current.version).is_gt()
    }
}
