//! The `ArtifactStore` coordinator (§4.3): binds a `StorageProvider` to a
//! `SessionProvider`, enforces the scope-check invariants, and retries
//! transient provider errors. Grounded on `ArtifactWrapper`
//! (`distri-filesystem/src/artifact.rs`) for the coordinating-wrapper shape
//! and id-generation idiom, and on `distri/src/stores/mod.rs` for binding
//! providers from configuration at construction.

use crate::config::GridConfig;
use crate::error::{GridError, GridResult};
use crate::federation::{log_federation_error, FederationLocation, FederationManager, LocatedArtifact};
use crate::key;
use crate::metadata::{ArtifactMetadata, Scope};
use crate::multipart::{MultipartRecord, MultipartUploadManager, PartUpload};
use crate::namespace::NamespaceRegistry;
use crate::retry::with_retry;
use crate::session::{build_session_provider, SessionManager, SessionProvider};
use crate::storage::presign::{Operation as PresignOp, Signer};
use crate::storage::{build_storage_provider, StorageProvider};
use crate::streaming::{self, ProgressCallback, StreamUploadResult};
use bytes::Bytes;
use chrono::Utc;
use futures_util::Stream;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const SHORT_TTL: u64 = 900;
const MEDIUM_TTL: u64 = 3_600;
const LONG_TTL: u64 = 86_400;

fn artifact_record_key(artifact_id: &str) -> String {
    format!("artifact:{artifact_id}")
}

fn session_index_key(session_id: &str) -> String {
    format!("session-index:{session_id}")
}

/// Maps a `StorageProvider::provider_name()` to the URL scheme its presigned
/// URLs carry, so only that provider resolves them (§6: `memory://`,
/// `file://`, …). Unrecognized/future provider names fall back to `grid`.
fn presign_scheme(provider_name: &str) -> &'static str {
    match provider_name {
        "memory" => "memory",
        "filesystem" => "file",
        "s3" => "s3",
        "vfs-sqlite" => "vfs-sqlite",
        _ => "grid",
    }
}

/// The artifact-grid facade. One instance is bound to one sandbox identity
/// and one pair of providers; it is cheap to clone (everything inside is
/// `Arc`-backed) and safe to share across concurrent callers.
#[derive(Clone)]
pub struct ArtifactStore {
    storage: Arc<dyn StorageProvider>,
    session: Arc<dyn SessionProvider>,
    sessions: Arc<SessionManager>,
    multipart: Arc<MultipartUploadManager>,
    namespaces: Arc<NamespaceRegistry>,
    federation: Option<Arc<FederationManager>>,
    signer: Arc<Signer>,
    sandbox_id: String,
    max_retries: u32,
    default_ttl_seconds: u64,
    session_provider_name: &'static str,
}

impl ArtifactStore {
    /// Builds an `ArtifactStore` from configuration, constructing its
    /// storage and session providers via the registry-of-factories pattern
    /// (`build_storage_provider`/`build_session_provider`).
    pub fn new(config: GridConfig) -> GridResult<Self> {
        let storage = build_storage_provider(&config.storage_provider)?;
        let session = build_session_provider(&config.session_provider)?;
        Self::with_providers(config, storage, session)
    }

    pub fn with_providers(config: GridConfig, storage: Arc<dyn StorageProvider>, session: Arc<dyn SessionProvider>) -> GridResult<Self> {
        let sessions = Arc::new(SessionManager::new(session.clone(), config.sandbox_id.clone()));
        let multipart = Arc::new(MultipartUploadManager::new(session.clone(), config.sandbox_id.clone()));
        let namespaces = Arc::new(NamespaceRegistry::new(storage.clone(), session.clone(), config.sandbox_id.clone()));
        let federation = if config.federation_enabled {
            Some(Arc::new(FederationManager::new(session.clone(), config.sandbox_id.clone(), config.federation_ttl_days)))
        } else {
            None
        };
        // The signing secret is derived from the sandbox id so that
        // presigned URLs minted by one sandbox cannot be replayed against
        // another; a production deployment would inject a real secret
        // instead, but the facade has no secrets-manager integration point.
        // The URL scheme identifies which provider must resolve it, so it is
        // derived from the bound `StorageProvider` rather than fixed (§6).
        let scheme = presign_scheme(storage.provider_name());
        let signer = Arc::new(Signer::new(format!("grid-signer:{}", config.sandbox_id), scheme));
        let session_provider_name = match &config.session_provider {
            crate::config::SessionProviderConfig::Memory => "memory",
            crate::config::SessionProviderConfig::Redis { .. } => "redis",
        };

        Ok(ArtifactStore {
            storage,
            session,
            sessions,
            multipart,
            namespaces,
            federation,
            signer,
            sandbox_id: config.sandbox_id,
            max_retries: config.max_retries,
            default_ttl_seconds: config.default_ttl_seconds,
            session_provider_name,
        })
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    pub fn multipart(&self) -> &MultipartUploadManager {
        &self.multipart
    }

    fn scope_marker(&self, scope: Scope, owner_id: Option<&str>, session_id: Option<&str>) -> GridResult<String> {
        match scope {
            Scope::Session => Ok(key::session_marker(session_id.unwrap_or_default())),
            Scope::User => Ok(key::user_marker(owner_id.ok_or(GridError::MissingUserIdForUserScope)?)),
            Scope::Sandbox => Ok(key::SHARED_MARKER.to_string()),
        }
    }

    fn check_scope(&self, meta: &ArtifactMetadata, session_id: Option<&str>, user_id: Option<&str>) -> GridResult<()> {
        match meta.scope {
            Scope::Session => {
                if let Some(sid) = session_id {
                    if meta.session_id.as_deref() != Some(sid) {
                        return Err(GridError::AccessDenied(format!(
                            "artifact {} belongs to a different session", meta.artifact_id
                        )));
                    }
                }
                Ok(())
            }
            Scope::User => {
                let uid = user_id.ok_or(GridError::MissingUserIdForUserScope)?;
                if meta.owner_id.as_deref() != Some(uid) {
                    return Err(GridError::AccessDenied(format!(
                        "artifact {} belongs to a different user", meta.artifact_id
                    )));
                }
                Ok(())
            }
            Scope::Sandbox => Ok(()),
        }
    }

    async fn write_metadata(&self, meta: &ArtifactMetadata) -> GridResult<()> {
        let encoded = serde_json::to_string(meta)?;
        self.session.setex(&artifact_record_key(&meta.artifact_id), meta.ttl, &encoded).await?;
        if let Some(session_id) = &meta.session_id {
            crate::session::json_set::add(self.session.as_ref(), &session_index_key(session_id), &meta.artifact_id, meta.ttl).await?;
        }
        Ok(())
    }

    async fn register_federation(&self, meta: &ArtifactMetadata) {
        let Some(federation) = &self.federation else { return };
        let location = FederationLocation {
            artifact_id: meta.artifact_id.clone(),
            sandbox_id: meta.sandbox_id.clone(),
            session_id: meta.session_id.clone(),
            grid_key: meta.key.clone(),
            size: meta.bytes,
            mime: meta.mime.clone(),
            stored_at: meta.stored_at,
            checksum: Some(meta.sha256.clone()),
        };
        if let Err(e) = federation.index().register(&location).await {
            log_federation_error("store", e);
        }
    }

    async fn unregister_federation(&self, artifact_id: &str) {
        let Some(federation) = &self.federation else { return };
        if let Err(e) = federation.index().unregister(artifact_id).await {
            log_federation_error("delete", e);
        }
    }

    /// Stores `data` under a new artifact id. See §4.3.1 for the full contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        data: Bytes,
        mime: &str,
        summary: &str,
        meta: Option<HashMap<String, serde_json::Value>>,
        filename: Option<String>,
        session_id: Option<String>,
        user_id: Option<String>,
        scope: Scope,
        ttl: Option<u64>,
    ) -> GridResult<String> {
        if scope == Scope::User && user_id.is_none() {
            return Err(GridError::MissingUserIdForUserScope);
        }

        let session_id = match (scope, session_id) {
            (Scope::Session, Some(sid)) => Some(sid),
            (Scope::Session, None) => Some(self.sessions.allocate(user_id.clone(), self.default_ttl_seconds, None).await?),
            _ => None,
        };

        let artifact_id = Uuid::new_v4().simple().to_string();
        let marker = self.scope_marker(scope, user_id.as_deref(), session_id.as_deref())?;
        let grid_key = key::build(&self.sandbox_id, &marker, &artifact_id, None)?;

        let sha256 = hex::encode(Sha256::digest(&data));
        let bytes_len = data.len() as u64;
        let ttl = ttl.unwrap_or(self.default_ttl_seconds);

        let storage = self.storage.clone();
        let put_key = grid_key.clone();
        let put_data = data.clone();
        let put_mime = mime.to_string();
        with_retry(self.max_retries, || {
            let storage = storage.clone();
            let put_key = put_key.clone();
            let put_data = put_data.clone();
            let put_mime = put_mime.clone();
            async move { storage.put(&put_key, put_data, &put_mime).await }
        })
        .await?;

        let artifact_meta = ArtifactMetadata {
            artifact_id: artifact_id.clone(),
            session_id,
            sandbox_id: self.sandbox_id.clone(),
            scope,
            owner_id: user_id,
            key: grid_key.clone(),
            mime: mime.to_string(),
            bytes: bytes_len,
            sha256,
            summary: summary.to_string(),
            filename,
            meta: meta.unwrap_or_default(),
            stored_at: Utc::now(),
            ttl,
            storage_provider: self.storage.provider_name().to_string(),
            session_provider: self.session_provider_name.to_string(),
        };

        if let Err(e) = self.write_metadata(&artifact_meta).await {
            // Best-effort rollback: the object was written but its metadata
            // wasn't, so delete it before surfacing the error (§7).
            let _ = self.storage.delete(&grid_key).await;
            return Err(GridError::MetadataWriteFailed(e.to_string()));
        }

        self.register_federation(&artifact_meta).await;
        Ok(artifact_id)
    }

    pub async fn metadata(&self, artifact_id: &str) -> GridResult<ArtifactMetadata> {
        match self.session.get(&artifact_record_key(artifact_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(GridError::ArtifactNotFound(artifact_id.to_string())),
        }
    }

    pub async fn exists(&self, artifact_id: &str) -> GridResult<bool> {
        Ok(self.session.get(&artifact_record_key(artifact_id)).await?.is_some())
    }

    pub async fn retrieve(&self, artifact_id: &str, session_id: Option<&str>, user_id: Option<&str>) -> GridResult<Bytes> {
        let meta = self.metadata(artifact_id).await?;
        self.check_scope(&meta, session_id, user_id)?;
        let storage = self.storage.clone();
        let key = meta.key.clone();
        with_retry(self.max_retries, || {
            let storage = storage.clone();
            let key = key.clone();
            async move { storage.get(&key).await }
        })
        .await
    }

    pub async fn read_file(&self, artifact_id: &str, session_id: Option<&str>, user_id: Option<&str>, as_text: bool) -> GridResult<FileContent> {
        let bytes = self.retrieve(artifact_id, session_id, user_id).await?;
        if as_text {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| GridError::IntegrityError(format!("artifact is not valid UTF-8: {e}")))?;
            Ok(FileContent::Text(text))
        } else {
            Ok(FileContent::Binary(bytes))
        }
    }

    pub async fn delete(&self, artifact_id: &str, user_id: Option<&str>) -> GridResult<bool> {
        let meta = self.metadata(artifact_id).await?;
        if meta.scope == Scope::Sandbox {
            return Err(GridError::AccessDenied("sandbox-scoped artifacts cannot be deleted through the public delete call".into()));
        }
        self.check_scope(&meta, None, user_id)?;

        self.storage.delete(&meta.key).await?;
        self.session.delete(&artifact_record_key(artifact_id)).await?;
        if let Some(session_id) = &meta.session_id {
            crate::session::json_set::remove(self.session.as_ref(), &session_index_key(session_id), artifact_id, meta.ttl).await?;
        }
        self.unregister_federation(artifact_id).await;
        Ok(true)
    }

    pub async fn update_file(
        &self,
        artifact_id: &str,
        data: Option<Bytes>,
        mime: Option<String>,
        summary: Option<String>,
        meta_patch: Option<HashMap<String, serde_json::Value>>,
        filename: Option<String>,
    ) -> GridResult<()> {
        let mut current = self.metadata(artifact_id).await?;
        if let Some(data) = data {
            current.sha256 = hex::encode(Sha256::digest(&data));
            current.bytes = data.len() as u64;
            self.storage.put(&current.key, data, mime.as_deref().unwrap_or(&current.mime)).await?;
        }
        if let Some(mime) = mime {
            current.mime = mime;
        }
        if let Some(summary) = summary {
            current.summary = summary;
        }
        if let Some(patch) = meta_patch {
            current.meta.extend(patch);
        }
        if let Some(filename) = filename {
            current.filename = Some(filename);
        }
        self.write_metadata(&current).await
    }

    pub async fn update_metadata(&self, artifact_id: &str, patch: HashMap<String, serde_json::Value>) -> GridResult<()> {
        let mut current = self.metadata(artifact_id).await?;
        current.meta.extend(patch);
        self.write_metadata(&current).await
    }

    pub async fn extend_ttl(&self, artifact_id: &str, additional_seconds: u64) -> GridResult<()> {
        let mut current = self.metadata(artifact_id).await?;
        current.ttl += additional_seconds;
        self.write_metadata(&current).await
    }

    pub async fn copy_file(&self, artifact_id: &str, new_filename: Option<String>, target_session_id: Option<&str>, new_meta: Option<HashMap<String, serde_json::Value>>) -> GridResult<String> {
        let source = self.metadata(artifact_id).await?;
        if let Some(target) = target_session_id {
            if source.session_id.as_deref() != Some(target) {
                return Err(GridError::AccessDenied("cross-session copy is not permitted".into()));
            }
        }

        let new_id = Uuid::new_v4().simple().to_string();
        let marker = self.scope_marker(source.scope, source.owner_id.as_deref(), source.session_id.as_deref())?;
        let new_key = key::build(&self.sandbox_id, &marker, &new_id, None)?;
        self.storage.copy(&source.key, &new_key).await?;

        let mut new_meta_record = source.clone();
        new_meta_record.artifact_id = new_id.clone();
        new_meta_record.key = new_key;
        new_meta_record.filename = new_filename.or(source.filename);
        new_meta_record.stored_at = Utc::now();
        if let Some(patch) = new_meta {
            new_meta_record.meta.extend(patch);
        }
        self.write_metadata(&new_meta_record).await?;
        self.register_federation(&new_meta_record).await;
        Ok(new_id)
    }

    pub async fn move_file(&self, artifact_id: &str, new_filename: Option<String>, new_session_id: Option<&str>) -> GridResult<()> {
        let mut current = self.metadata(artifact_id).await?;
        if let Some(target) = new_session_id {
            if current.session_id.as_deref() != Some(target) {
                return Err(GridError::AccessDenied("cross-session move is not permitted".into()));
            }
        }
        if let Some(filename) = new_filename {
            current.filename = Some(filename);
        }
        self.write_metadata(&current).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn write_file(
        &self,
        content: Bytes,
        filename: String,
        mime: &str,
        summary: &str,
        session_id: Option<String>,
        overwrite_artifact_id: Option<&str>,
        meta: Option<HashMap<String, serde_json::Value>>,
    ) -> GridResult<String> {
        if let Some(existing_id) = overwrite_artifact_id {
            let existing = self.metadata(existing_id).await?;
            if existing.session_id != session_id {
                return Err(GridError::AccessDenied("cross-session overwrite is not permitted".into()));
            }
            self.update_file(existing_id, Some(content), Some(mime.to_string()), Some(summary.to_string()), meta, Some(filename)).await?;
            return Ok(existing_id.to_string());
        }
        self.store(content, mime, summary, meta, Some(filename), session_id, None, Scope::Session, None).await
    }

    pub async fn list_by_session(&self, session_id: &str, limit: usize) -> GridResult<Vec<ArtifactMetadata>> {
        let ids = crate::session::json_set::get(self.session.as_ref(), &session_index_key(session_id))
            .await?
            .unwrap_or_default();
        let mut out = Vec::new();
        for id in ids.into_iter().take(limit) {
            if let Ok(meta) = self.metadata(&id).await {
                out.push(meta);
            }
        }
        Ok(out)
    }

    pub async fn list_by_prefix(&self, session_id: &str, prefix: &str, limit: usize) -> GridResult<Vec<ArtifactMetadata>> {
        let all = self.list_by_session(session_id, usize::MAX).await?;
        Ok(all
            .into_iter()
            .filter(|m| m.filename.as_deref().map(|f| f.starts_with(prefix)).unwrap_or(false))
            .take(limit)
            .collect())
    }

    pub async fn get_directory_contents(&self, session_id: &str, dir: &str) -> GridResult<Vec<ArtifactMetadata>> {
        self.list_by_prefix(session_id, dir, usize::MAX).await
    }

    pub async fn search(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
        scope: Option<Scope>,
        mime_prefix: Option<&str>,
        meta_filter: Option<&HashMap<String, serde_json::Value>>,
    ) -> GridResult<Vec<ArtifactMetadata>> {
        let candidates = if let Some(sid) = session_id {
            self.list_by_session(sid, usize::MAX).await?
        } else {
            let Some(keys) = self.session.keys("artifact:").await? else {
                return Ok(Vec::new());
            };
            let mut out = Vec::new();
            for k in keys {
                if let Some(raw) = self.session.get(&k).await? {
                    out.push(serde_json::from_str::<ArtifactMetadata>(&raw)?);
                }
            }
            out
        };

        Ok(candidates
            .into_iter()
            .filter(|m| scope.map(|s| m.scope == s).unwrap_or(true))
            .filter(|m| user_id.map(|u| m.owner_id.as_deref() == Some(u)).unwrap_or(true))
            .filter(|m| mime_prefix.map(|p| m.mime.starts_with(p)).unwrap_or(true))
            .filter(|m| {
                meta_filter
                    .map(|filter| filter.iter().all(|(k, v)| m.meta.get(k) == Some(v)))
                    .unwrap_or(true)
            })
            .collect())
    }

    pub async fn presign(&self, artifact_id: &str, session_id: Option<&str>, user_id: Option<&str>, duration_seconds: u64) -> GridResult<String> {
        let meta = self.metadata(artifact_id).await?;
        self.check_scope(&meta, session_id, user_id)?;
        if !self.storage.exists(&meta.key).await? {
            return Err(GridError::ArtifactNotFound(artifact_id.to_string()));
        }
        Ok(self.signer.presign(&meta.key, PresignOp::Get, duration_seconds))
    }

    pub async fn presign_short(&self, artifact_id: &str, session_id: Option<&str>, user_id: Option<&str>) -> GridResult<String> {
        self.presign(artifact_id, session_id, user_id, SHORT_TTL).await
    }

    pub async fn presign_medium(&self, artifact_id: &str, session_id: Option<&str>, user_id: Option<&str>) -> GridResult<String> {
        self.presign(artifact_id, session_id, user_id, MEDIUM_TTL).await
    }

    pub async fn presign_long(&self, artifact_id: &str, session_id: Option<&str>, user_id: Option<&str>) -> GridResult<String> {
        self.presign(artifact_id, session_id, user_id, LONG_TTL).await
    }

    /// Reserves an artifact id and returns a presigned PUT URL. The caller
    /// must follow up with `register_uploaded` once the bytes have landed.
    pub async fn presign_upload(
        &self,
        session_id: Option<String>,
        filename: Option<String>,
        mime: Option<String>,
        duration_seconds: u64,
    ) -> GridResult<(String, String)> {
        let artifact_id = Uuid::new_v4().simple().to_string();
        let marker = self.scope_marker(Scope::Session, None, session_id.as_deref())?;
        let grid_key = key::build(&self.sandbox_id, &marker, &artifact_id, None)?;

        let pending = PendingUpload {
            artifact_id: artifact_id.clone(),
            key: grid_key.clone(),
            session_id,
            filename,
            mime: mime.unwrap_or_else(|| "application/octet-stream".to_string()),
        };
        let encoded = serde_json::to_string(&pending)?;
        self.session.setex(&format!("pending-upload:{artifact_id}"), duration_seconds.max(self.default_ttl_seconds), &encoded).await?;

        let url = self.signer.presign(&grid_key, PresignOp::Put, duration_seconds);
        Ok((artifact_id, url))
    }

    pub async fn presign_short_upload(&self, session_id: Option<String>, filename: Option<String>, mime: Option<String>) -> GridResult<(String, String)> {
        self.presign_upload(session_id, filename, mime, SHORT_TTL).await
    }

    pub async fn presign_medium_upload(&self, session_id: Option<String>, filename: Option<String>, mime: Option<String>) -> GridResult<(String, String)> {
        self.presign_upload(session_id, filename, mime, MEDIUM_TTL).await
    }

    pub async fn presign_long_upload(&self, session_id: Option<String>, filename: Option<String>, mime: Option<String>) -> GridResult<(String, String)> {
        self.presign_upload(session_id, filename, mime, LONG_TTL).await
    }

    /// Finalizes a `presign_upload` reservation once bytes have been PUT to
    /// the signed URL out of band.
    pub async fn register_uploaded(&self, artifact_id: &str, size: u64, sha256: Option<String>) -> GridResult<()> {
        let raw = self
            .session
            .get(&format!("pending-upload:{artifact_id}"))
            .await?
            .ok_or_else(|| GridError::ArtifactNotFound(artifact_id.to_string()))?;
        let pending: PendingUpload = serde_json::from_str(&raw)?;

        let sha256 = match sha256 {
            Some(s) => s,
            None => hex::encode(Sha256::digest(self.storage.get(&pending.key).await?)),
        };

        let artifact_meta = ArtifactMetadata {
            artifact_id: artifact_id.to_string(),
            session_id: pending.session_id,
            sandbox_id: self.sandbox_id.clone(),
            scope: Scope::Session,
            owner_id: None,
            key: pending.key,
            mime: pending.mime,
            bytes: size,
            sha256,
            summary: String::new(),
            filename: pending.filename,
            meta: HashMap::new(),
            stored_at: Utc::now(),
            ttl: self.default_ttl_seconds,
            storage_provider: self.storage.provider_name().to_string(),
            session_provider: self.session_provider_name.to_string(),
        };
        self.write_metadata(&artifact_meta).await?;
        self.session.delete(&format!("pending-upload:{artifact_id}")).await?;
        self.register_federation(&artifact_meta).await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn stream_upload<S>(
        &self,
        chunks: S,
        mime: &str,
        summary: &str,
        filename: Option<String>,
        user_id: Option<String>,
        content_length: Option<u64>,
        progress_callback: Option<ProgressCallback>,
        session_id: Option<String>,
    ) -> GridResult<String>
    where
        S: Stream<Item = GridResult<Bytes>> + Unpin,
    {
        let scope = if user_id.is_some() { Scope::User } else { Scope::Session };
        let session_id = match (scope, session_id) {
            (Scope::Session, Some(sid)) => Some(sid),
            (Scope::Session, None) => Some(self.sessions.allocate(user_id.clone(), self.default_ttl_seconds, None).await?),
            _ => None,
        };
        let artifact_id = Uuid::new_v4().simple().to_string();
        let marker = self.scope_marker(scope, user_id.as_deref(), session_id.as_deref())?;
        let grid_key = key::build(&self.sandbox_id, &marker, &artifact_id, None)?;

        let upload_result: GridResult<StreamUploadResult> =
            streaming::stream_upload(self.storage.as_ref(), &grid_key, mime, chunks, content_length, progress_callback).await;

        let result = match upload_result {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.delete(&grid_key).await;
                return Err(e);
            }
        };

        let artifact_meta = ArtifactMetadata {
            artifact_id: artifact_id.clone(),
            session_id,
            sandbox_id: self.sandbox_id.clone(),
            scope,
            owner_id: user_id,
            key: grid_key.clone(),
            mime: mime.to_string(),
            bytes: result.bytes,
            sha256: result.sha256,
            summary: summary.to_string(),
            filename,
            meta: HashMap::new(),
            stored_at: Utc::now(),
            ttl: self.default_ttl_seconds,
            storage_provider: self.storage.provider_name().to_string(),
            session_provider: self.session_provider_name.to_string(),
        };
        if let Err(e) = self.write_metadata(&artifact_meta).await {
            let _ = self.storage.delete(&grid_key).await;
            return Err(GridError::MetadataWriteFailed(e.to_string()));
        }
        self.register_federation(&artifact_meta).await;
        Ok(artifact_id)
    }

    pub async fn stream_download(
        &self,
        artifact_id: &str,
        chunk_size: usize,
        progress_callback: Option<ProgressCallback>,
        user_id: Option<&str>,
    ) -> GridResult<impl Stream<Item = GridResult<Bytes>>> {
        let meta = self.metadata(artifact_id).await?;
        self.check_scope(&meta, None, user_id)?;
        Ok(streaming::stream_download(self.storage.clone(), meta.key, chunk_size, progress_callback))
    }

    /// Executes independent `store` calls with bounded parallelism (default
    /// 8). Each slot is `Some(artifact_id)` on success or `None` on failure.
    pub async fn store_batch(&self, items: Vec<BatchStoreItem>, session_id: Option<String>) -> Vec<Option<String>> {
        use futures_util::stream::{self, StreamExt};

        let session_id = session_id;
        stream::iter(items.into_iter().map(|item| {
            let session_id = session_id.clone();
            async move {
                self.store(item.data, &item.mime, &item.summary, item.meta, item.filename, session_id, item.user_id, item.scope, None)
                    .await
                    .ok()
            }
        }))
        .buffered(8)
        .collect()
        .await
    }

    // --- Multipart -------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn initiate_multipart(
        &self,
        filename: Option<String>,
        mime: String,
        scope: Scope,
        owner_id: Option<String>,
        session_id: Option<String>,
        ttl: Option<u64>,
        meta: Option<HashMap<String, serde_json::Value>>,
    ) -> GridResult<MultipartRecord> {
        self.multipart.initiate(filename, mime, scope, owner_id, session_id, ttl.unwrap_or(self.default_ttl_seconds), meta).await
    }

    pub async fn upload_part(&self, upload_id: &str, part_number: u32, data: Bytes) -> GridResult<String> {
        let record = self.multipart.get(upload_id).await?;
        let part_key = format!("{}.part{part_number}", self.multipart.grid_key(&record)?);
        let etag = hex::encode(Sha256::digest(&data));
        let size = data.len() as u64;
        self.storage.put(&part_key, data, &record.mime).await?;
        self.multipart.record_part(upload_id, PartUpload { part_number, size, etag: etag.clone() }).await?;
        Ok(etag)
    }

    pub async fn get_part_upload_url(&self, upload_id: &str, part_number: u32, expires: u64) -> GridResult<String> {
        let record = self.multipart.get(upload_id).await?;
        let part_key = format!("{}.part{part_number}", self.multipart.grid_key(&record)?);
        Ok(self.signer.presign(&part_key, PresignOp::Put, expires))
    }

    /// Assembles the completed parts into the final object and writes
    /// metadata. Assumes parts were uploaded via `upload_part` (object is
    /// reassembled by concatenation in ascending part order).
    pub async fn complete_multipart(&self, upload_id: &str, summary: Option<String>) -> GridResult<String> {
        let record = self.multipart.complete(upload_id).await?;
        let final_key = self.multipart.grid_key(&record)?;

        let mut assembled = Vec::new();
        let mut total_size = 0u64;
        for (&part_number, &(size, _)) in &record.parts_uploaded {
            let part_key = format!("{final_key}.part{part_number}");
            let chunk = self.storage.get(&part_key).await?;
            assembled.extend_from_slice(&chunk);
            total_size += size;
        }
        let sha256 = hex::encode(Sha256::digest(&assembled));
        self.storage.put(&final_key, Bytes::from(assembled), &record.mime).await?;

        for &part_number in record.parts_uploaded.keys() {
            let _ = self.storage.delete(&format!("{final_key}.part{part_number}")).await;
        }

        let artifact_meta = ArtifactMetadata {
            artifact_id: record.artifact_id.clone(),
            session_id: record.session_id.clone(),
            sandbox_id: self.sandbox_id.clone(),
            scope: record.scope,
            owner_id: record.owner_id.clone(),
            key: final_key,
            mime: record.mime.clone(),
            bytes: total_size,
            sha256,
            summary: summary.unwrap_or_default(),
            filename: record.filename.clone(),
            meta: record.meta.clone(),
            stored_at: Utc::now(),
            ttl: record.ttl,
            storage_provider: self.storage.provider_name().to_string(),
            session_provider: self.session_provider_name.to_string(),
        };
        self.write_metadata(&artifact_meta).await?;
        self.register_federation(&artifact_meta).await;
        Ok(record.artifact_id)
    }

    pub async fn abort_multipart(&self, upload_id: &str) -> GridResult<bool> {
        let record = self.multipart.get(upload_id).await.ok();
        let aborted = self.multipart.abort(upload_id).await?;
        if let Some(record) = record {
            if let Ok(final_key) = self.multipart.grid_key(&record) {
                for &part_number in record.parts_uploaded.keys() {
                    let _ = self.storage.delete(&format!("{final_key}.part{part_number}")).await;
                }
            }
        }
        Ok(aborted)
    }

    // --- Federation (supplemented operations, §4.6.1) ---------------------

    pub async fn locate_artifact(&self, artifact_id: &str) -> GridResult<Option<LocatedArtifact>> {
        let local = self.metadata(artifact_id).await.ok();
        if local.is_some() {
            // Local hit short-circuits without touching the index.
            return match &self.federation {
                Some(federation) => federation.locate_artifact(artifact_id, local.as_ref()).await,
                None => Ok(local.map(|meta| LocatedArtifact {
                    sandbox_id: meta.sandbox_id,
                    session_id: meta.session_id,
                    grid_key: Some(meta.key),
                    size: Some(meta.bytes),
                    mime: Some(meta.mime),
                    stored_at: Some(meta.stored_at),
                    source: crate::federation::LocationSource::Local,
                })),
            };
        }
        match &self.federation {
            Some(federation) => federation.locate_artifact(artifact_id, None).await,
            None => Ok(None),
        }
    }

    pub async fn list_session_federated(&self, session_id: &str, limit: usize) -> GridResult<Vec<ArtifactMetadata>> {
        let mut local = self.list_by_session(session_id, limit).await?;
        if let Some(federation) = &self.federation {
            let remote = federation.index().list_session_locations(session_id).await?;
            let mut seen: std::collections::HashSet<_> = local.iter().map(|m| m.artifact_id.clone()).collect();
            for location in remote {
                if seen.insert(location.artifact_id.clone()) {
                    local.push(ArtifactMetadata {
                        artifact_id: location.artifact_id,
                        session_id: location.session_id,
                        sandbox_id: location.sandbox_id,
                        scope: Scope::Session,
                        owner_id: None,
                        key: location.grid_key,
                        mime: location.mime,
                        bytes: location.size,
                        sha256: location.checksum.unwrap_or_default(),
                        summary: String::new(),
                        filename: None,
                        meta: HashMap::new(),
                        stored_at: location.stored_at,
                        ttl: 0,
                        storage_provider: "remote".to_string(),
                        session_provider: self.session_provider_name.to_string(),
                    });
                }
            }
        }
        local.truncate(limit);
        Ok(local)
    }

    pub async fn session_distribution(&self, session_id: &str) -> GridResult<HashMap<String, Vec<String>>> {
        match &self.federation {
            Some(federation) => federation.session_distribution(session_id).await,
            None => Ok(HashMap::new()),
        }
    }

    pub async fn find_session_home_sandbox(&self, session_id: &str) -> GridResult<Option<String>> {
        match &self.federation {
            Some(federation) => federation.find_session_home_sandbox(session_id).await,
            None => Ok(None),
        }
    }

    pub async fn federation_stats(&self) -> GridResult<Option<crate::federation::FederationStats>> {
        match &self.federation {
            Some(federation) => Ok(Some(federation.index().stats().await?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PendingUpload {
    artifact_id: String,
    key: String,
    session_id: Option<String>,
    filename: Option<String>,
    mime: String,
}

pub struct BatchStoreItem {
    pub data: Bytes,
    pub mime: String,
    pub summary: String,
    pub meta: Option<HashMap<String, serde_json::Value>>,
    pub filename: Option<String>,
    pub user_id: Option<String>,
    pub scope: Scope,
}

pub enum FileContent {
    Text(String),
    Binary(Bytes),
}
