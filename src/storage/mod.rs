//! Storage backends for module artifacts.
//!
//! Every backend is a flat, key-addressed blob store. The coordinate codec
//! (`key`) and the listing engine (`listing`) are shared, so a backend only
//! has to enumerate keys under a prefix and move bytes.
//!
//! # Backends
//!
//! - `memory` - in-process map, for tests and throwaway registries
//! - `filesystem` - one file per artifact under a base directory
//! - `object` - any `object_store` implementation (S3 and compatibles)

mod filesystem;
pub mod key;
pub mod listing;
mod memory;
mod object;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::config::BackendKind;
use crate::module::{Module, ModuleFilter, Page};

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;
pub use object::ObjectStorage;

/// Artifact bytes in transit.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Wrap an in-memory payload as a [`ByteStream`].
pub fn byte_stream(data: impl Into<Bytes>) -> ByteStream {
    stream::once(std::future::ready(Ok(data.into()))).boxed()
}

/// Drain a [`ByteStream`] into one buffer.
pub async fn read_all(mut data: ByteStream) -> std::io::Result<Bytes> {
    let mut buffer = bytes::BytesMut::new();
    while let Some(chunk) = data.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}

/// Key-addressed artifact store.
///
/// Implementations must be safe to share across concurrent requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Enumerate every key starting with `prefix`, in backend order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// List modules matching `filter`, windowed by `offset`/`limit`.
    ///
    /// The returned page reports the unwindowed total.
    async fn list_modules(
        &self,
        filter: &ModuleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page> {
        let keys = self.list_keys(&key::prefix_for(filter)).await?;
        Ok(listing::list(keys, filter, offset, limit))
    }

    /// Store the full stream under the module's key, replacing any previous
    /// artifact. A failed write must not leave a readable key behind.
    async fn publish_module(&self, module: &Module, data: ByteStream) -> Result<()>;

    /// Open the artifact for reading. Fails with `RegistryError::NotFound`
    /// when the key is absent.
    async fn get_module_data(&self, module: &Module) -> Result<ByteStream>;

    /// Release backend resources. Called once during shutdown.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_byte_stream_read_all() {
        let data = read_all(byte_stream("hello")).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_all_concatenates_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"he")),
            Ok(Bytes::from_static(b"ll")),
            Ok(Bytes::from_static(b"o")),
        ];
        let data = read_all(stream::iter(chunks).boxed()).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_all_propagates_errors() {
        let chunks = vec![
            Ok(Bytes::from_static(b"he")),
            Err(std::io::Error::other("connection reset")),
        ];
        let result = read_all(stream::iter(chunks).boxed()).await;
        assert!(result.is_err());
    }
}
