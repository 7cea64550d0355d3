use super::{ObjectInfo, StorageProvider};
use crate::error::GridResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;

/// Adapts any `object_store::ObjectStore` (memory, local filesystem, S3) to
/// this crate's `StorageProvider` contract. Path sanitization mirrors the
/// `sanitize_object_path`/`ensure_safe_path` approach used by the
/// filesystem-store integration this is built on: grid keys are already
/// validated by `crate::key`, so this layer only translates string keys to
/// `object_store::path::Path`.
pub struct ObjectStoreBackedProvider {
    store: Arc<dyn ObjectStore>,
    name: &'static str,
}

impl ObjectStoreBackedProvider {
    pub fn new(store: Arc<dyn ObjectStore>, name: &'static str) -> Self {
        ObjectStoreBackedProvider { store, name }
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreBackedProvider {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> GridResult<()> {
        // object_store's put contract carries no portable content-type field
        // across all backends at this crate's pinned version; the MIME type
        // is authoritative in `ArtifactMetadata` instead and is not
        // duplicated into provider-level object attributes.
        let path = ObjectPath::from(key);
        self.store.put(&path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> GridResult<Bytes> {
        let path = ObjectPath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    async fn head(&self, key: &str) -> GridResult<ObjectInfo> {
        let path = ObjectPath::from(key);
        let meta = self.store.head(&path).await?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: meta.size as u64,
            content_type: None,
        })
    }

    async fn delete(&self, key: &str) -> GridResult<()> {
        let path = ObjectPath::from(key);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> GridResult<Vec<ObjectInfo>> {
        let path = ObjectPath::from(prefix);
        let stream = self.store.list(Some(&path));
        let metas: Vec<_> = stream.try_collect().await?;
        Ok(metas
            .into_iter()
            .map(|meta| ObjectInfo {
                key: meta.location.to_string(),
                size: meta.size as u64,
                content_type: None,
            })
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> GridResult<()> {
        let from_path = ObjectPath::from(from);
        let to_path = ObjectPath::from(to);
        self.store.copy(&from_path, &to_path).await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}
