//! Multipart upload state machine (`open -> completed | aborted`). No
//! direct teacher precedent exists for multipart uploads; the state shape
//! follows the semantics implied by the original system's multipart demo
//! (part-size floor, gap/size validation deferred to `complete`), expressed
//! through this crate's own error/result idiom.

use crate::error::{GridError, GridResult};
use crate::key;
use crate::metadata::Scope;
use crate::session::SessionProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Parts smaller than this are rejected by `complete`, except the final part.
pub const PART_SIZE_FLOOR: u64 = 5 * 1024 * 1024;
pub const MAX_PARTS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Open,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartRecord {
    pub upload_id: String,
    pub artifact_id: String,
    pub session_id: Option<String>,
    pub scope: Scope,
    pub owner_id: Option<String>,
    pub mime: String,
    pub filename: Option<String>,
    #[serde(default)]
    pub meta: std::collections::HashMap<String, serde_json::Value>,
    /// part_number -> (size, etag)
    #[serde(default)]
    pub parts_uploaded: BTreeMap<u32, (u64, String)>,
    pub state: UploadState,
    pub initiated_at: DateTime<Utc>,
    pub ttl: u64,
}

pub struct PartUpload {
    pub part_number: u32,
    pub size: u64,
    pub etag: String,
}

fn record_key(upload_id: &str) -> String {
    format!("multipart:{upload_id}")
}

/// Coordinates the multipart upload lifecycle against the session/metadata
/// provider. Object assembly itself is delegated to the bound
/// `StorageProvider` by the `ArtifactStore` coordinator at `complete` time;
/// this type only owns the bookkeeping state machine.
pub struct MultipartUploadManager {
    session: Arc<dyn SessionProvider>,
    sandbox_id: String,
}

impl MultipartUploadManager {
    pub fn new(session: Arc<dyn SessionProvider>, sandbox_id: impl Into<String>) -> Self {
        MultipartUploadManager { session, sandbox_id: sandbox_id.into() }
    }

    pub async fn initiate(
        &self,
        filename: Option<String>,
        mime: String,
        scope: Scope,
        owner_id: Option<String>,
        session_id: Option<String>,
        ttl: u64,
        meta: Option<std::collections::HashMap<String, serde_json::Value>>,
    ) -> GridResult<MultipartRecord> {
        if scope == Scope::User && owner_id.is_none() {
            return Err(GridError::MissingUserIdForUserScope);
        }
        let upload_id = Uuid::new_v4().to_string();
        let artifact_id = Uuid::new_v4().simple().to_string();
        let record = MultipartRecord {
            upload_id: upload_id.clone(),
            artifact_id,
            session_id,
            scope,
            owner_id,
            mime,
            filename,
            meta: meta.unwrap_or_default(),
            parts_uploaded: BTreeMap::new(),
            state: UploadState::Open,
            initiated_at: Utc::now(),
            ttl,
        };
        self.save(&record).await?;
        Ok(record)
    }

    async fn save(&self, record: &MultipartRecord) -> GridResult<()> {
        let encoded = serde_json::to_string(record)?;
        self.session.setex(&record_key(&record.upload_id), record.ttl, &encoded).await
    }

    pub async fn get(&self, upload_id: &str) -> GridResult<MultipartRecord> {
        match self.session.get(&record_key(upload_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(GridError::ArtifactNotFound(format!("multipart upload not found: {upload_id}"))),
        }
    }

    /// Records a part as uploaded. Parts may arrive in any order; gap and
    /// size-floor checks happen only in `complete`.
    pub async fn record_part(&self, upload_id: &str, part: PartUpload) -> GridResult<()> {
        let mut record = self.get(upload_id).await?;
        if record.state != UploadState::Open {
            return Err(GridError::UploadNotOpen(format!("upload {upload_id} is {:?}", record.state)));
        }
        if part.part_number == 0 || part.part_number > MAX_PARTS {
            return Err(GridError::InvalidPartSequence(format!(
                "part_number must be in [1, {MAX_PARTS}], got {}",
                part.part_number
            )));
        }
        record.parts_uploaded.insert(part.part_number, (part.size, part.etag));
        self.save(&record).await
    }

    /// Validates completeness (contiguous `1..N`, each part >= the size
    /// floor except the last) and transitions the record to `completed`.
    /// Returns the finished record; the caller (the `ArtifactStore`
    /// coordinator) is responsible for instructing the storage provider to
    /// assemble the object and for writing the final `ArtifactMetadata`.
    pub async fn complete(&self, upload_id: &str) -> GridResult<MultipartRecord> {
        let mut record = self.get(upload_id).await?;
        if record.state != UploadState::Open {
            return Err(GridError::UploadNotOpen(format!("upload {upload_id} is {:?}", record.state)));
        }
        if record.parts_uploaded.is_empty() {
            return Err(GridError::InvalidPartSequence("no parts uploaded".into()));
        }

        let part_numbers: Vec<u32> = record.parts_uploaded.keys().copied().collect();
        let expected: Vec<u32> = (1..=part_numbers.len() as u32).collect();
        if part_numbers != expected {
            return Err(GridError::InvalidPartSequence(format!(
                "parts must be contiguous starting at 1, got {part_numbers:?}"
            )));
        }

        let last = *part_numbers.last().unwrap();
        for (&number, &(size, _)) in &record.parts_uploaded {
            if number != last && size < PART_SIZE_FLOOR {
                return Err(GridError::PartTooSmall(format!(
                    "part {number} is {size} bytes, below the {PART_SIZE_FLOOR}-byte floor"
                )));
            }
        }

        record.state = UploadState::Completed;
        self.save(&record).await?;
        Ok(record)
    }

    /// Aborts an upload. Idempotent: returns `true` on the first call from
    /// `open`, `false` on every call thereafter; never raises.
    pub async fn abort(&self, upload_id: &str) -> GridResult<bool> {
        let mut record = match self.get(upload_id).await {
            Ok(r) => r,
            Err(GridError::ArtifactNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if record.state != UploadState::Open {
            return Ok(false);
        }
        record.state = UploadState::Aborted;
        self.save(&record).await?;
        Ok(true)
    }

    pub fn grid_key(&self, record: &MultipartRecord) -> GridResult<String> {
        let marker = match record.scope {
            Scope::Session => key::session_marker(record.session_id.as_deref().unwrap_or_default()),
            Scope::User => key::user_marker(record.owner_id.as_deref().unwrap_or_default()),
            Scope::Sandbox => key::SHARED_MARKER.to_string(),
        };
        key::build(&self.sandbox_id, &marker, &record.artifact_id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionProvider;

    fn manager() -> MultipartUploadManager {
        MultipartUploadManager::new(Arc::new(MemorySessionProvider::new()), "sb1")
    }

    async fn initiate(mgr: &MultipartUploadManager) -> MultipartRecord {
        mgr.initiate(Some("v.bin".into()), "video/mp4".into(), Scope::User, Some("u1".into()), None, 3600, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn happy_path_completes() {
        let mgr = manager();
        let record = initiate(&mgr).await;
        mgr.record_part(&record.upload_id, PartUpload { part_number: 1, size: 5 * 1024 * 1024, etag: "e1".into() }).await.unwrap();
        mgr.record_part(&record.upload_id, PartUpload { part_number: 2, size: 5 * 1024 * 1024, etag: "e2".into() }).await.unwrap();
        mgr.record_part(&record.upload_id, PartUpload { part_number: 3, size: 128, etag: "e3".into() }).await.unwrap();
        let completed = mgr.complete(&record.upload_id).await.unwrap();
        assert_eq!(completed.state, UploadState::Completed);
        let total: u64 = completed.parts_uploaded.values().map(|(size, _)| *size).sum();
        assert_eq!(total, 5 * 1024 * 1024 * 2 + 128);
    }

    #[tokio::test]
    async fn part_too_small_rejected() {
        let mgr = manager();
        let record = initiate(&mgr).await;
        mgr.record_part(&record.upload_id, PartUpload { part_number: 1, size: 5 * 1024 * 1024, etag: "e1".into() }).await.unwrap();
        mgr.record_part(&record.upload_id, PartUpload { part_number: 2, size: 1024, etag: "e2".into() }).await.unwrap();
        mgr.record_part(&record.upload_id, PartUpload { part_number: 3, size: 128, etag: "e3".into() }).await.unwrap();
        let err = mgr.complete(&record.upload_id).await.unwrap_err();
        assert!(matches!(err, GridError::PartTooSmall(_)));
        assert!(mgr.abort(&record.upload_id).await.unwrap());
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let mgr = manager();
        let record = initiate(&mgr).await;
        assert!(mgr.abort(&record.upload_id).await.unwrap());
        assert!(!mgr.abort(&record.upload_id).await.unwrap());
    }

    #[tokio::test]
    async fn gap_in_parts_rejected() {
        let mgr = manager();
        let record = initiate(&mgr).await;
        mgr.record_part(&record.upload_id, PartUpload { part_number: 1, size: 5 * 1024 * 1024, etag: "e1".into() }).await.unwrap();
        mgr.record_part(&record.upload_id, PartUpload { part_number: 3, size: 128, etag: "e3".into() }).await.unwrap();
        let err = mgr.complete(&record.upload_id).await.unwrap_err();
        assert!(matches!(err, GridError::InvalidPartSequence(_)));
    }
}
