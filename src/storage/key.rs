//! Coordinate <-> storage key codec.
//!
//! A module is stored under `namespace/name/provider/version.tgz`.

use crate::module::{Module, ModuleFilter};

/// Separator between key segments.
pub const DELIMITER: char = '/';

/// Suffix of every artifact key.
pub const MODULE_EXTENSION: &str = ".tgz";

/// Encode a coordinate into its storage key.
pub fn encode(module: &Module) -> String {
    format!(
        "{ns}{d}{name}{d}{provider}{d}{version}{ext}",
        ns = module.namespace,
        name = module.name,
        provider = module.provider,
        version = module.version,
        d = DELIMITER,
        ext = MODULE_EXTENSION,
    )
}

/// The narrowest key prefix implied by the leading set fields of a filter.
///
/// Narrowing stops at the first unset field, so a provider filter without
/// namespace and name yields the empty prefix. A non-empty prefix always ends
/// with the delimiter.
pub fn prefix_for(filter: &ModuleFilter) -> String {
    let mut prefix = String::new();
    for field in [&filter.namespace, &filter.name, &filter.provider] {
        match field.as_deref() {
            Some(value) if !value.is_empty() => {
                prefix.push_str(value);
                prefix.push(DELIMITER);
            }
            _ => break,
        }
    }
    prefix
}

/// Decode a storage key. Returns `None` for anything that is not exactly four
/// non-empty segments ending in the artifact suffix.
pub fn decode(key: &str) -> Option<Module> {
    let parts: Vec<&str> = key.split(DELIMITER).collect();
    let [namespace, name, provider, file] = parts.as_slice() else {
        return None;
    };
    let version = file.strip_suffix(MODULE_EXTENSION)?;

    if [*namespace, *name, *provider, version]
        .iter()
        .any(|segment| segment.is_empty())
    {
        return None;
    }

    Some(Module::new(*namespace, *name, *provider, version))
}
