//! Registry error taxonomy.
//!
//! Domain conditions travel inside `anyhow::Error` as [`RegistryError`];
//! [`classify`] recovers the condition at the protocol boundary. Anything that
//! is not a `RegistryError` is a backend failure.

/// Domain conditions raised by the registry core.
#[derive(Debug)]
pub enum RegistryError {
    /// No matching record or stored object.
    NotFound(String),
    /// The exact version is already published and overwrites are disabled.
    AlreadyExists(String),
    /// A coordinate segment cannot be encoded into a storage key.
    InvalidCoordinate(String),
    /// The caller cancelled the request or its deadline elapsed.
    Cancelled(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotFound(what) => write!(f, "Not found: {}", what),
            RegistryError::AlreadyExists(what) => write!(f, "Already exists: {}", what),
            RegistryError::InvalidCoordinate(msg) => write!(f, "Invalid coordinate: {}", msg),
            RegistryError::Cancelled(op) => write!(f, "Cancelled: {}", op),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Coarse error classes used to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Cancelled,
    Backend,
}

/// Classifies an error raised anywhere below the protocol adapter.
pub fn classify(error: &anyhow::Error) -> ErrorKind {
    match error.downcast_ref::<RegistryError>() {
        Some(RegistryError::NotFound(_)) => ErrorKind::NotFound,
        Some(RegistryError::AlreadyExists(_)) => ErrorKind::AlreadyExists,
        Some(RegistryError::InvalidCoordinate(_)) => ErrorKind::InvalidInput,
        Some(RegistryError::Cancelled(_)) => ErrorKind::Cancelled,
        None => ErrorKind::Backend,
    }
}
