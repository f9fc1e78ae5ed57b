//! Listing and pagination over raw key enumerations.
//!
//! Backends enumerate keys under a prefix; this module turns them into
//! filtered, windowed pages. Enumeration order is preserved.

use log::debug;

use super::key;
use crate::module::{Module, ModuleFilter, Page};

/// Decode keys into records, skipping malformed keys and records the filter
/// rejects.
pub fn collect_modules<I, S>(keys: I, filter: &ModuleFilter) -> Vec<Module>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter_map(|k| {
            let decoded = key::decode(k.as_ref());
            if decoded.is_none() {
                debug!("Skipping key that is not a module: {}", k.as_ref());
            }
            decoded
        })
        .filter(|m| filter.matches(m))
        .collect()
}

/// Window a filtered record set to `[offset, offset + limit)`.
///
/// An offset at or past the end yields an empty page that still reports the
/// full total.
pub fn paginate(modules: Vec<Module>, offset: usize, limit: usize) -> Page {
    let total = modules.len();
    let modules = if offset >= total {
        Vec::new()
    } else {
        let end = offset.saturating_add(limit).min(total);
        modules.into_iter().skip(offset).take(end - offset).collect()
    };

    Page {
        modules,
        offset,
        limit,
        total,
    }
}

/// Decode, filter and window in one step.
pub fn list<I, S>(keys: I, filter: &ModuleFilter, offset: usize, limit: usize) -> Page
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paginate(collect_modules(keys, filter), offset, limit)
}
