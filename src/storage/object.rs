//! Object storage backend (S3 and anything else `object_store` speaks).
//!
//! Uploads go through a multipart upload, which only becomes visible once
//! completed and is aborted if the incoming stream fails.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use log::{debug, info, warn};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, WriteMultipart};
use std::sync::Arc;

use super::key::{self, DELIMITER};
use super::{ByteStream, Storage};
use crate::config::BackendKind;
use crate::error::RegistryError;
use crate::module::Module;

/// In-flight part uploads per artifact.
const MAX_CONCURRENT_PARTS: usize = 4;

pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStorage {
    /// Wrap an already configured store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        info!("Using object storage {}", store);
        Self { store }
    }

    /// Connect to an S3 bucket. Credentials come from the usual `AWS_*`
    /// environment variables.
    pub fn s3(bucket: &str, region: Option<&str>, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .with_context(|| format!("Failed to configure S3 bucket {}", bucket))?;
        Ok(Self::new(Arc::new(store)))
    }

    fn location(module: &Module) -> Result<ObjectPath> {
        module.validate()?;
        let key = key::encode(module);
        ObjectPath::parse(&key).with_context(|| format!("Invalid object key {}", key))
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    #[tracing::instrument(skip(self))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_end_matches(DELIMITER);
        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::parse(prefix).with_context(|| format!("Invalid prefix {}", prefix))?)
        };

        let objects: Vec<ObjectMeta> = self
            .store
            .list(prefix.as_ref())
            .try_collect()
            .await
            .context("Failed to list objects")?;

        debug!("Listed {} objects", objects.len());
        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    #[tracing::instrument(skip(self, data))]
    async fn publish_module(&self, module: &Module, data: ByteStream) -> Result<()> {
        let location = Self::location(module)?;
        let upload = self
            .store
            .put_multipart(&location)
            .await
            .with_context(|| format!("Failed to start upload for {}", location))?;

        let mut writer = WriteMultipart::new(upload);
        if let Err(e) = copy_into(&mut writer, data).await {
            if let Err(abort) = writer.abort().await {
                warn!("Failed to abort upload for {}: {}", location, abort);
            }
            return Err(e);
        }

        writer
            .finish()
            .await
            .with_context(|| format!("Failed to complete upload for {}", location))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_module_data(&self, module: &Module) -> Result<ByteStream> {
        let location = Self::location(module)?;
        match self.store.get(&location).await {
            Ok(result) => Ok(result
                .into_stream()
                .map_err(std::io::Error::other)
                .boxed()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(RegistryError::NotFound(module.to_string()).into())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", location)),
        }
    }

    async fn close(&self) -> Result<()> {
        info!("Closing object storage {}", self.store);
        Ok(())
    }
}

async fn copy_into(writer: &mut WriteMultipart, mut data: ByteStream) -> Result<u64> {
    let mut written: u64 = 0;
    while let Some(chunk) = data.next().await {
        let chunk = chunk.context("Failed to read upload stream")?;
        writer
            .wait_for_capacity(MAX_CONCURRENT_PARTS)
            .await
            .context("Failed to upload part")?;
        writer.write(&chunk);
        written += chunk.len() as u64;
    }
    Ok(written)
}
