mod filesystem;
mod memory;
mod object_store_backed;
pub mod presign;
mod s3;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use object_store_backed::ObjectStoreBackedProvider;

use crate::config::StorageProviderConfig;
use crate::error::GridResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Metadata returned by `head`/`list`, independent of any single provider's
/// wire representation.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// The minimal object-storage contract every adapter (memory, filesystem,
/// S3, vfs-sqlite) satisfies: put/get/head/delete/list/copy over an opaque
/// bucket, addressed by grid key.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> GridResult<()>;
    async fn get(&self, key: &str) -> GridResult<Bytes>;
    async fn head(&self, key: &str) -> GridResult<ObjectInfo>;
    async fn delete(&self, key: &str) -> GridResult<()>;
    /// Lists objects whose key starts with `prefix`. Not guaranteed to be
    /// strongly consistent immediately after a write (S3-class providers).
    async fn list(&self, prefix: &str) -> GridResult<Vec<ObjectInfo>>;
    async fn copy(&self, from: &str, to: &str) -> GridResult<()>;
    async fn exists(&self, key: &str) -> GridResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(crate::error::GridError::ArtifactNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Human-readable provider name, recorded in `ArtifactMetadata::storage_provider`.
    fn provider_name(&self) -> &'static str;
}

/// Builds a `StorageProvider` from configuration.
pub fn build_storage_provider(config: &StorageProviderConfig) -> GridResult<Arc<dyn StorageProvider>> {
    match config {
        StorageProviderConfig::Memory => Ok(Arc::new(memory::build()?)),
        StorageProviderConfig::FileSystem { root } => Ok(Arc::new(filesystem::build(root)?)),
        StorageProviderConfig::S3 {
            bucket,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
            path_style,
        } => Ok(Arc::new(s3::build(bucket, region.as_deref(), endpoint.as_deref(), access_key_id.as_deref(), secret_access_key.as_deref(), *path_style)?)),
        #[cfg(feature = "sqlite")]
        StorageProviderConfig::VfsSqlite { path } => Ok(Arc::new(sqlite::SqliteStorageProvider::open(path)?)),
        #[cfg(not(feature = "sqlite"))]
        StorageProviderConfig::VfsSqlite { .. } => Err(crate::error::GridError::ConfigurationError(
            "vfs-sqlite storage provider requested but the 'sqlite' feature is not enabled".into(),
        )),
    }
}
