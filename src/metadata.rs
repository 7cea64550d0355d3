use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Isolation scope for an artifact, namespace, or multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Session,
    User,
    Sandbox,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Session => "session",
            Scope::User => "user",
            Scope::Sandbox => "sandbox",
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Session
    }
}

/// The metadata record written alongside every stored artifact.
///
/// Persisted as JSON under the session provider's `artifact:{artifact_id}` key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactMetadata {
    pub artifact_id: String,
    pub session_id: Option<String>,
    pub sandbox_id: String,
    pub scope: Scope,
    pub owner_id: Option<String>,
    /// The grid key under which the object bytes are stored.
    pub key: String,
    pub mime: String,
    pub bytes: u64,
    pub sha256: String,
    pub summary: String,
    pub filename: Option<String>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    pub stored_at: DateTime<Utc>,
    pub ttl: u64,
    pub storage_provider: String,
    pub session_provider: String,
}

/// A namespace record (§4.4). `BLOB` namespaces hold exactly `_data` and
/// `_meta.json`; `WORKSPACE` namespaces hold an arbitrary tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceType {
    Blob,
    Workspace,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NamespaceInfo {
    pub namespace_id: String,
    pub namespace_type: NamespaceType,
    pub name: Option<String>,
    pub scope: Scope,
    pub sandbox_id: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub grid_path: String,
    pub provider_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointInfo {
    pub checkpoint_id: String,
    pub namespace_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub snapshot_ref: String,
}
