use super::object_store_backed::ObjectStoreBackedProvider;
use crate::error::GridResult;
use object_store::memory::InMemory;
use std::sync::Arc;

pub fn build() -> GridResult<ObjectStoreBackedProvider> {
    Ok(ObjectStoreBackedProvider::new(Arc::new(InMemory::new()), "memory"))
}
