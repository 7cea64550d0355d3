//! A pluggable artifact storage facade: tenant-isolated blob and workspace
//! storage over interchangeable object-storage providers (in-memory, local
//! filesystem, S3-compatible, vfs-sqlite) and interchangeable session/
//! metadata TTL key-value providers (in-memory, Redis), with presigned
//! URLs, multipart and streaming transfer paths, and a best-effort
//! cross-sandbox federation index.

pub mod config;
pub mod error;
pub mod federation;
pub mod key;
pub mod metadata;
pub mod multipart;
pub mod namespace;
mod retry;
pub mod session;
pub mod storage;
mod store;
pub mod streaming;

pub use config::{GridConfig, SessionProviderConfig, StorageProviderConfig};
pub use error::{GridError, GridResult};
pub use federation::{FederationIndex, FederationLocation, FederationManager, FederationStats, LocatedArtifact, LocationSource};
pub use metadata::{ArtifactMetadata, CheckpointInfo, NamespaceInfo, NamespaceType, Scope};
pub use multipart::{MultipartRecord, MultipartUploadManager, UploadState, MAX_PARTS, PART_SIZE_FLOOR};
pub use namespace::{BlobMetadata, NamespaceRegistry, NamespaceVfs, NodeInfo, StorageStats};
pub use session::{MemorySessionProvider, SessionInfo, SessionManager, SessionProvider};
pub use storage::{ObjectInfo, StorageProvider};
pub use store::{ArtifactStore, BatchStoreItem, FileContent};
pub use streaming::ProgressCallback;

#[cfg(feature = "redis")]
pub use session::RedisSessionProvider;
