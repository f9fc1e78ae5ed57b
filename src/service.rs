//! Module service: the operations the protocol adapter is built on.
//!
//! Every backend call runs under the caller's [`RequestScope`], so a
//! cancelled or expired request aborts the backend work it started.

use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::module::{Module, ModuleFilter, Page, VersionResolver};
use crate::scope::RequestScope;
use crate::storage::{ByteStream, Storage};

/// What publish does when the exact version is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Replace the stored artifact.
    #[default]
    Overwrite,
    /// Fail with `RegistryError::AlreadyExists`. The check and the write are
    /// separate backend calls, so two concurrent publishers can still race.
    RejectExisting,
}

#[derive(Clone)]
pub struct ModuleService {
    storage: Arc<dyn Storage>,
    publish_mode: PublishMode,
}

impl ModuleService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            publish_mode: PublishMode::default(),
        }
    }

    pub fn with_publish_mode(mut self, publish_mode: PublishMode) -> Self {
        self.publish_mode = publish_mode;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn publish_mode(&self) -> PublishMode {
        self.publish_mode
    }

    /// Filtered, windowed listing.
    #[tracing::instrument(skip(self, scope))]
    pub async fn query(
        &self,
        scope: &RequestScope,
        filter: &ModuleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page> {
        filter.validate()?;
        scope
            .run(
                "list modules",
                self.storage.list_modules(filter, offset, limit),
            )
            .await
    }

    /// Every record matching `filter`, unwindowed.
    #[tracing::instrument(skip(self, scope))]
    pub async fn query_versions(
        &self,
        scope: &RequestScope,
        filter: &ModuleFilter,
    ) -> Result<Vec<Module>> {
        let page = self.query(scope, filter, 0, usize::MAX).await?;
        Ok(page.modules)
    }

    /// Whether the exact version string is stored for the module/provider.
    pub async fn exists(&self, scope: &RequestScope, module: &Module) -> Result<bool> {
        Ok(self.get(scope, module).await?.is_some())
    }

    /// The stored record with exactly this version string, if any.
    ///
    /// Scans every version of the module/provider; version counts are small.
    #[tracing::instrument(skip(self, scope))]
    pub async fn get(&self, scope: &RequestScope, module: &Module) -> Result<Option<Module>> {
        module.validate()?;
        let versions = self
            .query_versions(scope, &ModuleFilter::from(module))
            .await?;
        Ok(versions.into_iter().find(|m| m.version == module.version))
    }

    /// Highest version stored for one module/provider.
    pub async fn latest(
        &self,
        scope: &RequestScope,
        filter: &ModuleFilter,
    ) -> Result<Option<Module>> {
        let versions = self.query_versions(scope, filter).await?;
        Ok(VersionResolver::latest(&versions).cloned())
    }

    /// Highest version per provider, sorted by provider.
    pub async fn latest_per_provider(
        &self,
        scope: &RequestScope,
        filter: &ModuleFilter,
    ) -> Result<Vec<Module>> {
        let versions = self.query_versions(scope, filter).await?;
        Ok(VersionResolver::latest_per_provider(&versions)
            .into_iter()
            .cloned()
            .collect())
    }

    #[tracing::instrument(skip(self, scope, data))]
    pub async fn publish(
        &self,
        scope: &RequestScope,
        module: &Module,
        data: ByteStream,
    ) -> Result<()> {
        module.validate()?;

        if self.publish_mode == PublishMode::RejectExisting && self.exists(scope, module).await? {
            return Err(RegistryError::AlreadyExists(module.to_string()).into());
        }

        scope
            .run("publish module", self.storage.publish_module(module, data))
            .await?;
        info!("Published {}", module);
        Ok(())
    }

    /// Open the stored artifact. Only opening is bounded by the scope; the
    /// returned stream is consumed by the caller.
    #[tracing::instrument(skip(self, scope))]
    pub async fn get_data(&self, scope: &RequestScope, module: &Module) -> Result<ByteStream> {
        module.validate()?;
        debug!("Opening artifact {}", module);
        scope
            .run("read module data", self.storage.get_module_data(module))
            .await
    }
}
