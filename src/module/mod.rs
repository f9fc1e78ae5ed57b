//! Module records and the query types built on them.
//!
//! A [`Module`] is the (namespace, name, provider, version) coordinate of one
//! stored artifact. Records are derived from storage keys at listing time;
//! nothing else about a module is persisted.

mod version;

use std::fmt;

use crate::error::RegistryError;

pub use version::VersionResolver;

/// Coordinate of one published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Module {
    pub namespace: String,
    pub name: String,
    pub provider: String,
    pub version: String,
}

impl Module {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            provider: provider.into(),
            version: version.into(),
        }
    }

    /// The `namespace/name/provider` part, used as the versions list source.
    pub fn source(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.provider)
    }

    /// Rejects coordinates that would not survive a round-trip through a
    /// storage key: empty segments, `.`/`..`, and path separators.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("name", &self.name),
            ("provider", &self.provider),
            ("version", &self.version),
        ] {
            validate_segment(field, value)?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.name, self.provider, self.version
        )
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), RegistryError> {
    if value.is_empty() {
        return Err(RegistryError::InvalidCoordinate(format!(
            "{} must not be empty",
            field
        )));
    }
    if value == "." || value == ".." {
        return Err(RegistryError::InvalidCoordinate(format!(
            "{} must not be '{}'",
            field, value
        )));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(RegistryError::InvalidCoordinate(format!(
            "{} must not contain path separators: {}",
            field, value
        )));
    }
    Ok(())
}

/// Equality filter over the leading coordinate fields. `None` matches all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleFilter {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub provider: Option<String>,
}

impl ModuleFilter {
    /// Filter matching every stored module.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter for every version of one module/provider.
    pub fn versions_of(
        namespace: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: Some(name.into()),
            provider: Some(provider.into()),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = non_empty(namespace.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = non_empty(name.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = non_empty(provider.into());
        self
    }

    /// Applies the coordinate segment rules to every set field, so a filter
    /// can never widen into a prefix outside the key space.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("name", &self.name),
            ("provider", &self.provider),
        ] {
            if let Some(value) = value {
                validate_segment(field, value)?;
            }
        }
        Ok(())
    }

    /// Whether a record satisfies every set field.
    pub fn matches(&self, module: &Module) -> bool {
        fn field_matches(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().is_none_or(|f| f == value)
        }

        field_matches(&self.namespace, &module.namespace)
            && field_matches(&self.name, &module.name)
            && field_matches(&self.provider, &module.provider)
    }
}

impl From<&Module> for ModuleFilter {
    fn from(module: &Module) -> Self {
        Self::versions_of(&module.namespace, &module.name, &module.provider)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// A window over a filtered listing.
///
/// `total` counts every matching record before windowing, so it does not
/// depend on `offset` or `limit`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub modules: Vec<Module>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
