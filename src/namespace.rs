//! The unified "everything is VFS" namespace layer (§4.4). Grounded on the
//! `FileSystem`/`FileSystemOps` coordinator-wraps-store-plus-derived-scope
//! pattern (`distri-filesystem/src/wrapper.rs`) and the recursive-traversal
//! shape of its grep searcher (`distri-filesystem/src/search.rs`), adapted
//! here to a plain glob-pattern `find` since this crate has no content-grep
//! requirement.

use crate::error::{GridError, GridResult};
use crate::key;
use crate::metadata::{CheckpointInfo, NamespaceInfo, NamespaceType, Scope};
use crate::session::SessionProvider;
use crate::storage::StorageProvider;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const MARKER_SUFFIX: &str = "/.dir";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Sidecar metadata object written alongside a BLOB namespace's `_data`
/// payload (§3: "exactly two provider objects: `_data` ... and `_meta.json`
/// (sidecar metadata)"). Carries the content-type that the underlying
/// `StorageProvider`/`object_store` layer has no uniform place to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    pub size: u64,
    pub updated_at: DateTime<Utc>,
}

fn namespace_record_key(namespace_id: &str) -> String {
    format!("namespace:{namespace_id}")
}

fn checkpoint_record_key(namespace_id: &str, checkpoint_id: &str) -> String {
    format!("checkpoint:{namespace_id}:{checkpoint_id}")
}

/// Creates, lists, and destroys namespaces; hands out a [`NamespaceVfs`] for
/// tree-level operations within one namespace.
pub struct NamespaceRegistry {
    storage: Arc<dyn StorageProvider>,
    session: Arc<dyn SessionProvider>,
    sandbox_id: String,
}

impl NamespaceRegistry {
    pub fn new(storage: Arc<dyn StorageProvider>, session: Arc<dyn SessionProvider>, sandbox_id: impl Into<String>) -> Self {
        NamespaceRegistry { storage, session, sandbox_id: sandbox_id.into() }
    }

    fn scope_marker(&self, scope: Scope, user_id: Option<&str>, session_id: Option<&str>) -> GridResult<String> {
        match scope {
            Scope::Session => Ok(key::session_marker(session_id.ok_or_else(|| {
                GridError::SessionError("session_id is required for scope=session namespaces".into())
            })?)),
            Scope::User => Ok(key::user_marker(user_id.ok_or(GridError::MissingUserIdForUserScope)?)),
            Scope::Sandbox => Ok(key::SHARED_MARKER.to_string()),
        }
    }

    pub async fn create_namespace(
        &self,
        namespace_type: NamespaceType,
        scope: Scope,
        name: Option<String>,
        user_id: Option<String>,
        session_id: Option<String>,
        provider_type: Option<String>,
    ) -> GridResult<NamespaceInfo> {
        let namespace_id = Uuid::new_v4().simple().to_string();
        let marker = self.scope_marker(scope, user_id.as_deref(), session_id.as_deref())?;
        let grid_path = key::build(&self.sandbox_id, &marker, &namespace_id, None)?;

        let info = NamespaceInfo {
            namespace_id: namespace_id.clone(),
            namespace_type,
            name,
            scope,
            sandbox_id: self.sandbox_id.clone(),
            session_id,
            user_id,
            grid_path,
            provider_type: provider_type.unwrap_or_else(|| self.storage.provider_name().to_string()),
            created_at: Utc::now(),
        };
        let encoded = serde_json::to_string(&info)?;
        // Namespace records have no natural TTL; use a long-lived TTL matching
        // sandbox-scoped artifacts rather than inventing a "no expiry" notion
        // the SessionProvider abstraction doesn't support.
        self.session.setex(&namespace_record_key(&namespace_id), 365 * 86_400, &encoded).await?;
        Ok(info)
    }

    pub async fn get_namespace(&self, namespace_id: &str) -> GridResult<NamespaceInfo> {
        match self.session.get(&namespace_record_key(namespace_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(GridError::ArtifactNotFound(format!("namespace not found: {namespace_id}"))),
        }
    }

    pub async fn list_namespaces(
        &self,
        session_id: Option<&str>,
        user_id: Option<&str>,
        namespace_type: Option<NamespaceType>,
    ) -> GridResult<Vec<NamespaceInfo>> {
        let Some(keys) = self.session.keys("namespace:").await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for k in keys {
            let Some(raw) = self.session.get(&k).await? else { continue };
            let info: NamespaceInfo = serde_json::from_str(&raw)?;
            if let Some(sid) = session_id {
                if info.session_id.as_deref() != Some(sid) {
                    continue;
                }
            }
            if let Some(uid) = user_id {
                if info.user_id.as_deref() != Some(uid) {
                    continue;
                }
            }
            if let Some(t) = namespace_type {
                if info.namespace_type != t {
                    continue;
                }
            }
            out.push(info);
        }
        Ok(out)
    }

    pub async fn destroy_namespace(&self, namespace_id: &str) -> GridResult<()> {
        let info = self.get_namespace(namespace_id).await?;
        let objects = self.storage.list(&info.grid_path).await?;
        for object in objects {
            self.storage.delete(&object.key).await?;
        }
        self.session.delete(&namespace_record_key(namespace_id)).await
    }

    pub fn vfs(&self, namespace_id: &str, grid_path: String) -> NamespaceVfs {
        NamespaceVfs {
            storage: self.storage.clone(),
            session: self.session.clone(),
            namespace_id: namespace_id.to_string(),
            root: grid_path,
        }
    }

    pub async fn get_namespace_vfs(&self, namespace_id: &str) -> GridResult<NamespaceVfs> {
        let info = self.get_namespace(namespace_id).await?;
        Ok(self.vfs(namespace_id, info.grid_path))
    }

    pub async fn write_namespace(&self, namespace_id: &str, data: Bytes, path: Option<&str>, content_type: Option<&str>) -> GridResult<()> {
        let info = self.get_namespace(namespace_id).await?;
        let mime = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
        match info.namespace_type {
            NamespaceType::Blob => {
                if let Some(p) = path {
                    if p != "/_data" && !p.is_empty() {
                        return Err(GridError::MalformedKey(format!("BLOB namespaces only accept path '/_data', got '{p}'")));
                    }
                }
                let size = data.len() as u64;
                self.storage.put(&format!("{}/_data", info.grid_path), data, mime).await?;

                let sidecar = BlobMetadata { content_type: mime.to_string(), size, updated_at: Utc::now() };
                let encoded = serde_json::to_vec(&sidecar)?;
                self.storage.put(&format!("{}/_meta.json", info.grid_path), Bytes::from(encoded), "application/json").await
            }
            NamespaceType::Workspace => {
                let p = path.ok_or_else(|| GridError::MalformedKey("WORKSPACE writes require a path".into()))?;
                let vfs = self.vfs(namespace_id, info.grid_path);
                self.storage.put(&vfs.full_key(p)?, data, mime).await?;
                let mut meta = vfs.get_metadata(p).await?;
                meta.insert("content_type".to_string(), serde_json::Value::String(mime.to_string()));
                vfs.set_metadata(p, meta).await
            }
        }
    }

    pub async fn read_namespace(&self, namespace_id: &str, path: Option<&str>) -> GridResult<Bytes> {
        let info = self.get_namespace(namespace_id).await?;
        let key = match info.namespace_type {
            NamespaceType::Blob => format!("{}/_data", info.grid_path),
            NamespaceType::Workspace => {
                let p = path.ok_or_else(|| GridError::MalformedKey("WORKSPACE reads require a path".into()))?;
                self.vfs(namespace_id, info.grid_path).full_key(p)?
            }
        };
        self.storage.get(&key).await
    }

    /// Reads the `_meta.json` sidecar written alongside a BLOB namespace's
    /// `_data` payload, recovering the content-type `StorageProvider`/
    /// `object_store` itself has no uniform way to persist.
    pub async fn get_blob_metadata(&self, namespace_id: &str) -> GridResult<BlobMetadata> {
        let info = self.get_namespace(namespace_id).await?;
        if info.namespace_type != NamespaceType::Blob {
            return Err(GridError::MalformedKey(format!("namespace {namespace_id} is not a BLOB namespace")));
        }
        let bytes = self.storage.get(&format!("{}/_meta.json", info.grid_path)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn checkpoint_namespace(&self, namespace_id: &str, name: Option<String>, description: Option<String>) -> GridResult<CheckpointInfo> {
        let info = self.get_namespace(namespace_id).await?;
        let checkpoint_id = Uuid::new_v4().simple().to_string();
        let snapshot_prefix = format!("{}/_checkpoints/{}", info.grid_path, checkpoint_id);

        let objects = self.storage.list(&info.grid_path).await?;
        for object in objects {
            if object.key.starts_with(&format!("{}/_checkpoints/", info.grid_path)) {
                continue;
            }
            let Some(relative) = object.key.strip_prefix(&format!("{}/", info.grid_path)) else { continue };
            let dest = format!("{snapshot_prefix}/{relative}");
            self.storage.copy(&object.key, &dest).await?;
        }

        let checkpoint = CheckpointInfo {
            checkpoint_id: checkpoint_id.clone(),
            namespace_id: namespace_id.to_string(),
            name,
            description,
            created_at: Utc::now(),
            snapshot_ref: snapshot_prefix,
        };
        let encoded = serde_json::to_string(&checkpoint)?;
        self.session.setex(&checkpoint_record_key(namespace_id, &checkpoint_id), 365 * 86_400, &encoded).await?;
        Ok(checkpoint)
    }

    /// Restores live namespace contents from a checkpoint snapshot. Deletes
    /// current objects (excluding `_checkpoints/`) then copies the snapshot
    /// back. Not transactional at the object level — a failure mid-restore
    /// leaves the namespace in a mixed state by design (§9 Open Questions).
    pub async fn restore_namespace(&self, namespace_id: &str, checkpoint_id: &str) -> GridResult<()> {
        let info = self.get_namespace(namespace_id).await?;
        let checkpoint: CheckpointInfo = match self.session.get(&checkpoint_record_key(namespace_id, checkpoint_id)).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => return Err(GridError::ArtifactNotFound(format!("checkpoint not found: {checkpoint_id}"))),
        };

        let live_objects = self.storage.list(&info.grid_path).await?;
        let checkpoints_prefix = format!("{}/_checkpoints/", info.grid_path);
        for object in live_objects {
            if object.key.starts_with(&checkpoints_prefix) {
                continue;
            }
            self.storage.delete(&object.key).await?;
        }

        let snapshot_objects = self.storage.list(&checkpoint.snapshot_ref).await?;
        for object in snapshot_objects {
            let Some(relative) = object.key.strip_prefix(&format!("{}/", checkpoint.snapshot_ref)) else { continue };
            let dest = format!("{}/{}", info.grid_path, relative);
            self.storage.copy(&object.key, &dest).await?;
        }
        Ok(())
    }

    pub async fn list_checkpoints(&self, namespace_id: &str) -> GridResult<Vec<CheckpointInfo>> {
        let prefix = format!("checkpoint:{namespace_id}:");
        let Some(keys) = self.session.keys(&prefix).await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for k in keys {
            if let Some(raw) = self.session.get(&k).await? {
                out.push(serde_json::from_str::<CheckpointInfo>(&raw)?);
            }
        }
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }
}

/// A single node's listing entry, as returned by `ls`/`find`.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Storage usage summary for one namespace.
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub object_count: u64,
    pub total_bytes: u64,
}

/// Per-namespace virtual filesystem view. All paths are namespace-relative
/// (no leading `grid/...` prefix is ever visible to callers).
pub struct NamespaceVfs {
    storage: Arc<dyn StorageProvider>,
    session: Arc<dyn SessionProvider>,
    namespace_id: String,
    root: String,
}

/// Rejects `.`/`..` path segments so a workspace-relative path can never
/// escape its namespace's grid sub-tree, mirroring `key::validate_segment`'s
/// rejection of leading-dot segments for top-level grid keys.
fn reject_traversal(path: &str) -> GridResult<()> {
    for segment in path.trim_start_matches('/').split('/') {
        if segment == ".." || segment == "." {
            return Err(GridError::MalformedKey(format!("path must not contain '.' or '..' segments: {path}")));
        }
    }
    Ok(())
}

impl NamespaceVfs {
    fn full_key(&self, path: &str) -> GridResult<String> {
        reject_traversal(path)?;
        let trimmed = path.trim_start_matches('/');
        Ok(if trimmed.is_empty() {
            self.root.clone()
        } else {
            format!("{}/{}", self.root, trimmed)
        })
    }

    fn marker_key(&self, path: &str) -> GridResult<String> {
        Ok(format!("{}{}", self.full_key(path)?, MARKER_SUFFIX))
    }

    fn metadata_key(&self, path: &str) -> GridResult<String> {
        reject_traversal(path)?;
        Ok(format!("vfsmeta:{}:{}", self.namespace_id, path.trim_start_matches('/')))
    }

    pub async fn write_binary(&self, path: &str, data: Bytes) -> GridResult<()> {
        self.storage.put(&self.full_key(path)?, data, "application/octet-stream").await
    }

    pub async fn write_text(&self, path: &str, text: &str) -> GridResult<()> {
        self.storage.put(&self.full_key(path)?, Bytes::from(text.to_string()), "text/plain").await
    }

    pub async fn write_file(&self, path: &str, data: Bytes) -> GridResult<()> {
        self.write_binary(path, data).await
    }

    pub async fn read_binary(&self, path: &str) -> GridResult<Bytes> {
        self.storage.get(&self.full_key(path)?).await
    }

    pub async fn read_text(&self, path: &str) -> GridResult<String> {
        let bytes = self.read_binary(path).await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| GridError::IntegrityError(format!("file is not valid UTF-8: {e}")))
    }

    pub async fn read_file(&self, path: &str) -> GridResult<Bytes> {
        self.read_binary(path).await
    }

    pub async fn exists(&self, path: &str) -> GridResult<bool> {
        if self.storage.exists(&self.full_key(path)?).await? {
            return Ok(true);
        }
        self.storage.exists(&self.marker_key(path)?).await
    }

    pub async fn is_file(&self, path: &str) -> GridResult<bool> {
        self.storage.exists(&self.full_key(path)?).await
    }

    pub async fn is_dir(&self, path: &str) -> GridResult<bool> {
        if self.storage.exists(&self.marker_key(path)?).await? {
            return Ok(true);
        }
        let prefix = format!("{}/", self.full_key(path)?);
        Ok(!self.storage.list(&prefix).await?.is_empty())
    }

    pub async fn mkdir(&self, path: &str) -> GridResult<()> {
        self.storage.put(&self.marker_key(path)?, Bytes::new(), "application/x-directory").await
    }

    pub async fn rmdir(&self, path: &str) -> GridResult<()> {
        let prefix = format!("{}/", self.full_key(path)?);
        for object in self.storage.list(&prefix).await? {
            self.storage.delete(&object.key).await?;
        }
        self.storage.delete(&self.marker_key(path)?).await
    }

    pub async fn rm(&self, path: &str) -> GridResult<()> {
        self.storage.delete(&self.full_key(path)?).await
    }

    pub async fn touch(&self, path: &str) -> GridResult<()> {
        if !self.is_file(path).await? {
            self.write_binary(path, Bytes::new()).await?;
        }
        Ok(())
    }

    pub async fn cp(&self, from: &str, to: &str) -> GridResult<()> {
        self.storage.copy(&self.full_key(from)?, &self.full_key(to)?).await
    }

    pub async fn mv(&self, from: &str, to: &str) -> GridResult<()> {
        self.cp(from, to).await?;
        self.rm(from).await
    }

    pub async fn ls(&self, path: &str) -> GridResult<Vec<NodeInfo>> {
        let prefix = if path.is_empty() || path == "/" {
            format!("{}/", self.root)
        } else {
            format!("{}/", self.full_key(path)?)
        };
        let objects = self.storage.list(&prefix).await?;
        let mut entries = HashMap::new();
        for object in objects {
            let Some(relative) = object.key.strip_prefix(&prefix) else { continue };
            let first_segment = relative.split('/').next().unwrap_or(relative);
            let is_dir = relative.contains('/');
            let size = if is_dir { 0 } else { object.size };
            let entry = entries.entry(first_segment.to_string()).or_insert(NodeInfo {
                path: first_segment.to_string(),
                is_dir,
                size,
            });
            if is_dir {
                entry.is_dir = true;
            }
        }
        let mut out: Vec<_> = entries.into_values().filter(|e| e.path != ".dir").collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    /// Recursively finds paths under `path` (defaults to the namespace
    /// root) matching a glob pattern, e.g. `*.txt`.
    pub async fn find(&self, pattern: &str, path: Option<&str>, recursive: bool) -> GridResult<Vec<String>> {
        let glob_pattern = glob::Pattern::new(pattern)
            .map_err(|e| GridError::MalformedKey(format!("invalid glob pattern '{pattern}': {e}")))?;
        let prefix = match path {
            Some(p) if !p.is_empty() && p != "/" => format!("{}/", self.full_key(p)?),
            _ => format!("{}/", self.root),
        };
        let objects = self.storage.list(&prefix).await?;
        let mut out = Vec::new();
        for object in objects {
            let Some(relative) = object.key.strip_prefix(&prefix) else { continue };
            if relative.ends_with(MARKER_SUFFIX.trim_start_matches('/')) {
                continue;
            }
            if !recursive && relative.contains('/') {
                continue;
            }
            let leaf = relative.rsplit('/').next().unwrap_or(relative);
            if glob_pattern.matches(leaf) {
                out.push(relative.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    pub async fn get_metadata(&self, path: &str) -> GridResult<HashMap<String, serde_json::Value>> {
        match self.session.get(&self.metadata_key(path)?).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    pub async fn set_metadata(&self, path: &str, meta: HashMap<String, serde_json::Value>) -> GridResult<()> {
        let encoded = serde_json::to_string(&meta)?;
        self.session.setex(&self.metadata_key(path)?, 365 * 86_400, &encoded).await
    }

    pub async fn get_node_info(&self, path: &str) -> GridResult<NodeInfo> {
        if self.is_dir(path).await? {
            return Ok(NodeInfo { path: path.to_string(), is_dir: true, size: 0 });
        }
        let info = self.storage.head(&self.full_key(path)?).await?;
        Ok(NodeInfo { path: path.to_string(), is_dir: false, size: info.size })
    }

    pub async fn get_storage_stats(&self) -> GridResult<StorageStats> {
        let objects = self.storage.list(&format!("{}/", self.root)).await?;
        let object_count = objects.len() as u64;
        let total_bytes = objects.iter().map(|o| o.size).sum();
        Ok(StorageStats { object_count, total_bytes })
    }

    pub async fn batch_read_files(&self, paths: &[String]) -> GridResult<Vec<GridResult<Bytes>>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            out.push(self.read_binary(path).await);
        }
        Ok(out)
    }

    pub async fn batch_write_files(&self, files: &[(String, Bytes)]) -> GridResult<Vec<GridResult<()>>> {
        let mut out = Vec::with_capacity(files.len());
        for (path, data) in files {
            out.push(self.write_binary(path, data.clone()).await);
        }
        Ok(out)
    }

    pub async fn batch_delete_files(&self, paths: &[String]) -> GridResult<Vec<GridResult<()>>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            out.push(self.rm(path).await);
        }
        Ok(out)
    }

    pub async fn batch_create_files(&self, paths: &[String]) -> GridResult<Vec<GridResult<()>>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            out.push(self.touch(path).await);
        }
        Ok(out)
    }

    /// Returns a view scoped to a sub-directory, mirroring the
    /// `scoped(prefix)` re-derivation used by the filesystem coordinator
    /// this type is grounded on.
    pub fn cd(&self, path: &str) -> GridResult<NamespaceVfs> {
        Ok(NamespaceVfs {
            storage: self.storage.clone(),
            session: self.session.clone(),
            namespace_id: self.namespace_id.clone(),
            root: self.full_key(path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionProvider;
    use crate::storage::build_storage_provider;
    use crate::config::StorageProviderConfig;

    fn registry() -> NamespaceRegistry {
        let storage = build_storage_provider(&StorageProviderConfig::Memory).unwrap();
        let session = Arc::new(MemorySessionProvider::new());
        NamespaceRegistry::new(storage, session, "sb1")
    }

    #[tokio::test]
    async fn blob_roundtrip() {
        let registry = registry();
        let info = registry.create_namespace(NamespaceType::Blob, Scope::Sandbox, None, None, None, None).await.unwrap();
        registry.write_namespace(&info.namespace_id, Bytes::from_static(b"hello"), None, Some("text/plain")).await.unwrap();
        let data = registry.read_namespace(&info.namespace_id, None).await.unwrap();
        assert_eq!(&data[..], b"hello");

        let meta = registry.get_blob_metadata(&info.namespace_id).await.unwrap();
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn checkpoint_restore_roundtrip() {
        let registry = registry();
        let info = registry.create_namespace(NamespaceType::Workspace, Scope::Sandbox, None, None, None, None).await.unwrap();
        let vfs = registry.get_namespace_vfs(&info.namespace_id).await.unwrap();
        vfs.write_text("/a.txt", "1").await.unwrap();
        vfs.write_text("/b/c.txt", "2").await.unwrap();

        let checkpoint = registry.checkpoint_namespace(&info.namespace_id, Some("v1".into()), None).await.unwrap();

        vfs.write_text("/a.txt", "X").await.unwrap();
        vfs.rm("/b/c.txt").await.unwrap();

        registry.restore_namespace(&info.namespace_id, &checkpoint.checkpoint_id).await.unwrap();

        assert_eq!(vfs.read_text("/a.txt").await.unwrap(), "1");
        assert_eq!(vfs.read_text("/b/c.txt").await.unwrap(), "2");
    }

    #[tokio::test]
    async fn find_matches_glob_pattern() {
        let registry = registry();
        let info = registry.create_namespace(NamespaceType::Workspace, Scope::Sandbox, None, None, None, None).await.unwrap();
        let vfs = registry.get_namespace_vfs(&info.namespace_id).await.unwrap();
        vfs.write_text("/a.txt", "1").await.unwrap();
        vfs.write_text("/b/c.txt", "2").await.unwrap();
        vfs.write_text("/b/d.md", "3").await.unwrap();

        let matches = vfs.find("*.txt", None, true).await.unwrap();
        assert_eq!(matches, vec!["a.txt".to_string(), "b/c.txt".to_string()]);
    }

    #[tokio::test]
    async fn ls_lists_direct_children() {
        let registry = registry();
        let info = registry.create_namespace(NamespaceType::Workspace, Scope::Sandbox, None, None, None, None).await.unwrap();
        let vfs = registry.get_namespace_vfs(&info.namespace_id).await.unwrap();
        vfs.write_text("/a.txt", "1").await.unwrap();
        vfs.write_text("/b/c.txt", "2").await.unwrap();

        let entries = vfs.ls("").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(names, vec!["a.txt".to_string(), "b".to_string()]);
    }
}
