//! Runtime configuration and backend selection.

use anyhow::{Context, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::service::PublishMode;
use crate::storage::{FilesystemStorage, MemoryStorage, ObjectStorage, Storage};

/// Storage backend identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    Filesystem,
    S3,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Filesystem => write!(f, "filesystem"),
            BackendKind::S3 => write!(f, "s3"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "filesystem" => Ok(BackendKind::Filesystem),
            "s3" => Ok(BackendKind::S3),
            _ => anyhow::bail!(
                "Unknown backend: {}. Expected memory, filesystem, or s3.",
                s
            ),
        }
    }
}

/// Server options. Every option is also read from a `MODREG_*` variable.
#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "MODREG_BIND", value_name = "ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "MODREG_PORT", value_name = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Storage backend: memory, filesystem, or s3
    #[arg(long, env = "MODREG_BACKEND", value_name = "KIND", default_value_t = BackendKind::Memory)]
    pub backend: BackendKind,

    /// Root directory of the filesystem backend
    #[arg(long, env = "MODREG_BASE_PATH", value_name = "PATH")]
    pub base_path: Option<PathBuf>,

    /// Bucket of the s3 backend
    #[arg(long, env = "MODREG_S3_BUCKET", value_name = "BUCKET")]
    pub s3_bucket: Option<String>,

    /// Region of the s3 backend
    #[arg(long, env = "MODREG_S3_REGION", value_name = "REGION")]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint, e.g. a MinIO server
    #[arg(long, env = "MODREG_S3_ENDPOINT", value_name = "URL")]
    pub s3_endpoint: Option<String>,

    /// Per-request deadline in seconds (0 disables)
    #[arg(long, env = "MODREG_REQUEST_TIMEOUT", value_name = "SECS", default_value_t = 30)]
    pub request_timeout: u64,

    /// Reject publishing a version that already exists
    #[arg(long, env = "MODREG_IMMUTABLE_VERSIONS")]
    pub immutable_versions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            backend: BackendKind::Memory,
            base_path: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            request_timeout: 30,
            immutable_versions: false,
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    pub fn publish_mode(&self) -> PublishMode {
        if self.immutable_versions {
            PublishMode::RejectExisting
        } else {
            PublishMode::Overwrite
        }
    }

    /// Open the configured backend.
    pub fn open_storage(&self) -> Result<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match self.backend {
            BackendKind::Memory => Arc::new(MemoryStorage::new()),
            BackendKind::Filesystem => {
                let base_path = self
                    .base_path
                    .as_ref()
                    .context("The filesystem backend requires --base-path")?;
                Arc::new(FilesystemStorage::open(base_path)?)
            }
            BackendKind::S3 => {
                let bucket = self
                    .s3_bucket
                    .as_deref()
                    .context("The s3 backend requires --s3-bucket")?;
                Arc::new(ObjectStorage::s3(
                    bucket,
                    self.s3_region.as_deref(),
                    self.s3_endpoint.as_deref(),
                )?)
            }
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        let mut argv = vec!["modreg"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).map(|cli| cli.config)
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(BackendKind::Filesystem.to_string(), "filesystem");
        assert_eq!(BackendKind::S3.to_string(), "s3");
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(
            "FileSystem".parse::<BackendKind>().unwrap(),
            BackendKind::Filesystem
        );
        assert_eq!("S3".parse::<BackendKind>().unwrap(), BackendKind::S3);

        let err = "gcs".parse::<BackendKind>().unwrap_err();
        assert!(err.to_string().contains("Unknown backend: gcs"));
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.publish_mode(), PublishMode::Overwrite);
    }

    #[test]
    fn test_parse_flags() {
        let config = parse(&[
            "--bind",
            "127.0.0.1",
            "--port",
            "9000",
            "--backend",
            "filesystem",
            "--base-path",
            "/srv/modules",
            "--request-timeout",
            "0",
            "--immutable-versions",
        ])
        .unwrap();

        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.backend, BackendKind::Filesystem);
        assert_eq!(config.base_path, Some(PathBuf::from("/srv/modules")));
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.publish_mode(), PublishMode::RejectExisting);
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        assert!(parse(&["--backend", "ftp"]).is_err());
    }

    #[test]
    fn test_open_memory_storage() {
        let storage = Config::default().open_storage().unwrap();
        assert_eq!(storage.kind(), BackendKind::Memory);
    }

    #[test]
    fn test_open_filesystem_storage() {
        let dir = tempdir().unwrap();
        let config = Config {
            backend: BackendKind::Filesystem,
            base_path: Some(dir.path().join("modules")),
            ..Config::default()
        };

        let storage = config.open_storage().unwrap();
        assert_eq!(storage.kind(), BackendKind::Filesystem);
        assert!(dir.path().join("modules").is_dir());
    }

    #[test]
    fn test_open_requires_backend_options() {
        let config = Config {
            backend: BackendKind::Filesystem,
            ..Config::default()
        };
        let err = config.open_storage().err().unwrap();
        assert!(err.to_string().contains("--base-path"));

        let config = Config {
            backend: BackendKind::S3,
            ..Config::default()
        };
        let err = config.open_storage().err().unwrap();
        assert!(err.to_string().contains("--s3-bucket"));
    }
}
