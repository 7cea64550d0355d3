use super::object_store_backed::ObjectStoreBackedProvider;
use crate::error::{GridError, GridResult};
use object_store::aws::AmazonS3Builder;
use std::sync::Arc;

/// Builds an S3-compatible storage provider, matching the
/// `AmazonS3Builder`-driven factory this crate's object-store integration
/// is grounded on.
pub fn build(
    bucket: &str,
    region: Option<&str>,
    endpoint: Option<&str>,
    access_key_id: Option<&str>,
    secret_access_key: Option<&str>,
    path_style: bool,
) -> GridResult<ObjectStoreBackedProvider> {
    let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);
    if let Some(region) = region {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(key) = access_key_id {
        builder = builder.with_access_key_id(key);
    }
    if let Some(secret) = secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    if path_style {
        builder = builder.with_virtual_hosted_style_request(false);
    }
    let store = builder
        .build()
        .map_err(|e| GridError::ConfigurationError(format!("failed to build S3 storage provider: {e}")))?;
    Ok(ObjectStoreBackedProvider::new(Arc::new(store), "s3"))
}
