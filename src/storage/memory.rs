//! In-memory backend.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{ByteStream, Storage, byte_stream, key, read_all};
use crate::config::BackendKind;
use crate::error::RegistryError;
use crate::module::Module;

/// Artifacts kept in a sorted map, so listings come back in key order.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Bytes>>> {
        self.objects
            .read()
            .map_err(|_| anyhow!("Memory storage lock poisoned"))
    }

    fn objects_mut(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Bytes>>> {
        self.objects
            .write()
            .map_err(|_| anyhow!("Memory storage lock poisoned"))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    #[tracing::instrument(skip(self))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects()?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    #[tracing::instrument(skip(self, data))]
    async fn publish_module(&self, module: &Module, data: ByteStream) -> Result<()> {
        // Buffer first so readers never observe a partial artifact
        let data = read_all(data)
            .await
            .with_context(|| format!("Failed to read upload for {}", module))?;
        let key = key::encode(module);
        debug!("Storing {} bytes at {}", data.len(), key);
        self.objects_mut()?.insert(key, data);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_module_data(&self, module: &Module) -> Result<ByteStream> {
        let key = key::encode(module);
        let data = self
            .objects()?
            .get(&key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(module.to_string()))?;
        Ok(byte_stream(data))
    }

    async fn close(&self) -> Result<()> {
        let mut objects = self.objects_mut()?;
        info!("Closing memory storage ({} artifacts)", objects.len());
        objects.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, classify};
    use crate::module::ModuleFilter;
    use futures_util::stream::{self, StreamExt};

    async fn publish(storage: &MemoryStorage, module: &Module, data: &'static [u8]) {
        storage
            .publish_module(module, byte_stream(data))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_then_get() {
        let storage = MemoryStorage::new();
        let module = Module::new("ns", "name", "aws", "1.0.0");

        publish(&storage, &module, b"artifact").await;

        let data = read_all(storage.get_module_data(&module).await.unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"artifact");
    }

    #[tokio::test]
    async fn test_publish_overwrites() {
        let storage = MemoryStorage::new();
        let module = Module::new("ns", "name", "aws", "1.0.0");

        publish(&storage, &module, b"first").await;
        publish(&storage, &module, b"second").await;

        let data = read_all(storage.get_module_data(&module).await.unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"second");

        let page = storage
            .list_modules(&ModuleFilter::from(&module), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let storage = MemoryStorage::new();
        let module = Module::new("ns", "name", "aws", "9.9.9");

        let err = storage.get_module_data(&module).await.err().unwrap();
        assert_eq!(classify(&err), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_upload_stores_nothing() {
        let storage = MemoryStorage::new();
        let module = Module::new("ns", "name", "aws", "1.0.0");

        let data = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("client went away")),
        ])
        .boxed();

        assert!(storage.publish_module(&module, data).await.is_err());
        assert!(storage.list_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix() {
        let storage = MemoryStorage::new();
        publish(&storage, &Module::new("ns", "vpc", "aws", "1.0.0"), b"a").await;
        publish(&storage, &Module::new("ns", "vpc", "gcp", "1.0.0"), b"b").await;
        publish(&storage, &Module::new("ns", "vpcx", "aws", "1.0.0"), b"c").await;
        publish(&storage, &Module::new("other", "vpc", "aws", "1.0.0"), b"d").await;

        let keys = storage.list_keys("ns/vpc/").await.unwrap();
        assert_eq!(keys, vec!["ns/vpc/aws/1.0.0.tgz", "ns/vpc/gcp/1.0.0.tgz"]);

        assert_eq!(storage.list_keys("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_modules_filters_and_paginates() {
        let storage = MemoryStorage::new();
        for version in ["1.0.0", "1.1.0", "1.2.0"] {
            publish(&storage, &Module::new("ns", "vpc", "aws", version), b"x").await;
        }
        publish(&storage, &Module::new("ns", "vpc", "gcp", "1.0.0"), b"x").await;

        let page = storage
            .list_modules(&ModuleFilter::all().provider("aws"), 1, 1)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.modules.len(), 1);
        assert_eq!(page.modules[0].version, "1.1.0");
    }

    #[tokio::test]
    async fn test_close_releases_artifacts() {
        let storage = MemoryStorage::new();
        publish(&storage, &Module::new("ns", "vpc", "aws", "1.0.0"), b"x").await;

        storage.close().await.unwrap();
        assert!(storage.list_keys("").await.unwrap().is_empty());
        assert_eq!(storage.kind(), BackendKind::Memory);
    }
}
