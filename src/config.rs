use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env;

/// Storage provider selection and its per-provider settings.
///
/// Mirrors the `ObjectStorageConfig` enum shape used throughout the
/// filesystem/object-store integration this crate is built on.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum StorageProviderConfig {
    Memory,
    FileSystem {
        root: String,
    },
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        path_style: bool,
    },
    VfsSqlite {
        path: String,
    },
}

impl Default for StorageProviderConfig {
    fn default() -> Self {
        StorageProviderConfig::Memory
    }
}

/// Session/metadata provider selection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum SessionProviderConfig {
    Memory,
    Redis { url: String },
}

impl Default for SessionProviderConfig {
    fn default() -> Self {
        SessionProviderConfig::Memory
    }
}

/// Top-level configuration for a `GridStore`. See the `EXTERNAL INTERFACES`
/// section of the design docs for the full list of recognized options and
/// their environment variable overrides.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GridConfig {
    pub sandbox_id: String,
    pub storage_provider: StorageProviderConfig,
    pub session_provider: SessionProviderConfig,
    pub bucket: String,
    pub max_retries: u32,
    pub default_ttl_seconds: u64,
    pub federation_enabled: bool,
    pub federation_ttl_days: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            sandbox_id: format!("sandbox-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            storage_provider: StorageProviderConfig::default(),
            session_provider: SessionProviderConfig::default(),
            bucket: "artifacts".to_string(),
            max_retries: 3,
            default_ttl_seconds: 900,
            federation_enabled: false,
            federation_ttl_days: 30,
        }
    }
}

impl GridConfig {
    /// Applies the environment-variable overrides documented in
    /// `EXTERNAL INTERFACES` on top of whatever was set programmatically.
    /// Read once, at construction time; never re-read mid-process.
    pub fn from_env(mut self) -> Self {
        if let Ok(sandbox) = env::var("ARTIFACT_SANDBOX_ID") {
            self.sandbox_id = sandbox;
        }
        if let Ok(bucket) = env::var("ARTIFACT_BUCKET") {
            self.bucket = bucket;
        }
        if let Ok(provider) = env::var("ARTIFACT_PROVIDER") {
            self.storage_provider = match provider.as_str() {
                "memory" => StorageProviderConfig::Memory,
                "filesystem" => StorageProviderConfig::FileSystem {
                    root: env::var("ARTIFACT_FS_ROOT").unwrap_or_else(|_| "./artifacts".to_string()),
                },
                "s3" => StorageProviderConfig::S3 {
                    bucket: self.bucket.clone(),
                    region: env::var("AWS_REGION").ok(),
                    endpoint: env::var("S3_ENDPOINT_URL").ok(),
                    access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                    secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                    path_style: false,
                },
                _ => self.storage_provider,
            };
        }
        if let Ok(provider) = env::var("SESSION_PROVIDER") {
            self.session_provider = match provider.as_str() {
                "redis" => SessionProviderConfig::Redis {
                    url: env::var("SESSION_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
                },
                "memory" => SessionProviderConfig::Memory,
                _ => self.session_provider,
            };
        }
        self
    }
}
