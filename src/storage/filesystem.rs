use super::object_store_backed::ObjectStoreBackedProvider;
use crate::error::{GridError, GridResult};
use object_store::local::LocalFileSystem;
use std::sync::Arc;

/// Builds a filesystem-backed storage provider rooted at `root`, matching
/// the `LocalFileSystem::new_with_prefix` factory pattern used by the
/// object-store integration this crate is built on.
pub fn build(root: &str) -> GridResult<ObjectStoreBackedProvider> {
    std::fs::create_dir_all(root)
        .map_err(|e| GridError::ConfigurationError(format!("failed to create filesystem root '{root}': {e}")))?;
    let store = LocalFileSystem::new_with_prefix(root)
        .map_err(|e| GridError::ConfigurationError(format!("invalid filesystem root '{root}': {e}")))?;
    Ok(ObjectStoreBackedProvider::new(Arc::new(store), "filesystem"))
}
