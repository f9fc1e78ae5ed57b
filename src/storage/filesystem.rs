//! Filesystem backend.
//!
//! Layout: `<base>/<namespace>/<name>/<provider>/<version>.tgz`. Uploads are
//! written to a dot-prefixed temp file next to the target and renamed into
//! place once complete.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::key::{DELIMITER, MODULE_EXTENSION};
use super::{ByteStream, Storage};
use crate::config::BackendKind;
use crate::error::RegistryError;
use crate::module::Module;

/// Directory depth of an artifact below the base path.
const KEY_DEPTH: usize = 4;

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    /// Open (and create if needed) a storage root.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("Failed to create storage root {:?}", base_path))?;
        let base_path = base_path
            .canonicalize()
            .with_context(|| format!("Failed to resolve storage root {:?}", base_path))?;

        info!("Using filesystem storage with base path {:?}", base_path);
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of a module's artifact. Rejects coordinates that could escape the
    /// base path.
    fn module_path(&self, module: &Module) -> Result<PathBuf> {
        module.validate()?;
        Ok(self
            .base_path
            .join(&module.namespace)
            .join(&module.name)
            .join(&module.provider)
            .join(format!("{}{}", module.version, MODULE_EXTENSION)))
    }

    /// Glob pattern matching every file at artifact depth under `prefix`.
    fn listing_pattern(&self, prefix: &str) -> Result<String> {
        let base = self
            .base_path
            .to_str()
            .ok_or_else(|| anyhow!("Storage root is not valid UTF-8: {:?}", self.base_path))?;

        let segments: Vec<&str> = prefix.split(DELIMITER).filter(|s| !s.is_empty()).collect();
        if let Some(segment) = segments
            .iter()
            .find(|s| **s == "." || **s == ".." || s.contains('\\'))
        {
            return Err(RegistryError::InvalidCoordinate(format!(
                "listing prefix must not contain '{}'",
                segment
            ))
            .into());
        }

        let mut pattern = glob::Pattern::escape(base);
        for segment in &segments {
            pattern.push('/');
            pattern.push_str(&glob::Pattern::escape(segment));
        }
        for _ in segments.len()..KEY_DEPTH {
            pattern.push_str("/*");
        }
        Ok(pattern)
    }

    /// Storage key of a file under the base path.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Option<Vec<&str>> = relative.iter().map(|part| part.to_str()).collect();
        Some(parts?.join("/"))
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    #[tracing::instrument(skip(self))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = self.listing_pattern(prefix)?;
        debug!("Listing modules matching {}", pattern);

        let paths = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut files = Vec::new();
            for entry in glob::glob(&pattern).context("Invalid listing pattern")? {
                let path = entry.context("Failed to read module directory")?;
                if path.is_file() {
                    files.push(path);
                }
            }
            Ok(files)
        })
        .await
        .context("Listing task failed")??;

        Ok(paths.iter().filter_map(|path| self.key_for(path)).collect())
    }

    #[tracing::instrument(skip(self, data))]
    async fn publish_module(&self, module: &Module, data: ByteStream) -> Result<()> {
        let path = self.module_path(module)?;
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("Artifact path has no parent: {:?}", path))?;
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))?;

        let temp_path = dir.join(format!(
            ".{}{}.{}-{}.partial",
            module.version,
            MODULE_EXTENSION,
            std::process::id(),
            UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let written = write_stream(&temp_path, data).await;
        let result = match written {
            Ok(bytes) => {
                debug!("Wrote {} bytes to {:?}", bytes, temp_path);
                fs::rename(&temp_path, &path)
                    .await
                    .with_context(|| format!("Failed to move upload into place at {:?}", path))
            }
            Err(e) => Err(e),
        };

        if result.is_err()
            && let Err(e) = fs::remove_file(&temp_path).await
        {
            warn!("Failed to remove partial upload {:?}: {}", temp_path, e);
        }
        result
    }

    #[tracing::instrument(skip(self))]
    async fn get_module_data(&self, module: &Module) -> Result<ByteStream> {
        let path = self.module_path(module)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(ReaderStream::new(file).boxed()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::NotFound(module.to_string()).into())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to open artifact {:?}", path)),
        }
    }

    async fn close(&self) -> Result<()> {
        info!("Closing filesystem storage at {:?}", self.base_path);
        Ok(())
    }
}

async fn write_stream(path: &Path, mut data: ByteStream) -> Result<u64> {
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {:?}", path))?;

    let mut written: u64 = 0;
    while let Some(chunk) = data.next().await {
        let chunk = chunk.context("Failed to read upload stream")?;
        file.write_all(&chunk)
            .await
            .context("Failed to write chunk to file")?;
        written += chunk.len() as u64;
    }

    file.flush().await.context("Failed to flush upload")?;
    file.sync_all().await.context("Failed to sync upload")?;
    Ok(written)
}
