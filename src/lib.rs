pub mod api;
pub mod config;
pub mod error;
pub mod module;
pub mod scope;
pub mod service;
pub mod storage;

/// Version stamped at build time from `git describe`.
pub const VERSION: &str = env!("MODREG_VERSION");
