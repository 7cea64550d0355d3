use super::SessionProvider;
use crate::error::{GridError, GridResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default)]
    pub custom_metadata: HashMap<String, serde_json::Value>,
}

impl SessionInfo {
    fn is_valid(&self) -> bool {
        self.status == SessionStatus::Active && self.expires_at > Utc::now()
    }

    fn record_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }
}

/// Allocates, validates, and extends sessions against a `SessionProvider`.
/// Mirrors the TTL re-write-on-extend pattern used by the Redis-backed
/// session store this crate's `SessionProvider` adapters are grounded on.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    sandbox_id: String,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn SessionProvider>, sandbox_id: impl Into<String>) -> Self {
        SessionManager {
            provider,
            sandbox_id: sandbox_id.into(),
        }
    }

    pub async fn allocate(
        &self,
        user_id: Option<String>,
        ttl_seconds: u64,
        custom_metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> GridResult<String> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let info = SessionInfo {
            session_id: session_id.clone(),
            user_id,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_seconds as i64),
            status: SessionStatus::Active,
            custom_metadata: custom_metadata.unwrap_or_default(),
        };
        let encoded = serde_json::to_string(&info)?;
        self.provider
            .setex(&SessionInfo::record_key(&session_id), ttl_seconds, &encoded)
            .await?;
        Ok(session_id)
    }

    pub async fn get(&self, session_id: &str) -> GridResult<Option<SessionInfo>> {
        match self.provider.get(&SessionInfo::record_key(session_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn validate(&self, session_id: &str) -> GridResult<bool> {
        Ok(self.get(session_id).await?.map(|info| info.is_valid()).unwrap_or(false))
    }

    pub async fn extend(&self, session_id: &str, additional_seconds: u64) -> GridResult<()> {
        let Some(mut info) = self.get(session_id).await? else {
            return Ok(());
        };
        info.expires_at = info.expires_at + chrono::Duration::seconds(additional_seconds as i64);
        let ttl = (info.expires_at - Utc::now()).num_seconds().max(0) as u64;
        let encoded = serde_json::to_string(&info)?;
        self.provider.setex(&SessionInfo::record_key(session_id), ttl, &encoded).await
    }

    pub async fn update_metadata(&self, session_id: &str, patch: HashMap<String, serde_json::Value>) -> GridResult<()> {
        let Some(mut info) = self.get(session_id).await? else {
            return Err(GridError::SessionError(format!("unknown session: {session_id}")));
        };
        info.custom_metadata.extend(patch);
        let ttl = (info.expires_at - Utc::now()).num_seconds().max(0) as u64;
        let encoded = serde_json::to_string(&info)?;
        self.provider.setex(&SessionInfo::record_key(session_id), ttl, &encoded).await
    }

    pub fn canonical_prefix(&self, session_id: &str) -> String {
        format!("grid/{}/sess-{session_id}/", self.sandbox_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionProvider;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemorySessionProvider::new()), "sb1")
    }

    #[tokio::test]
    async fn allocate_then_validate() {
        let mgr = manager();
        let id = mgr.allocate(None, 60, None).await.unwrap();
        assert!(mgr.validate(&id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_session_is_invalid() {
        let mgr = manager();
        assert!(!mgr.validate("nope").await.unwrap());
    }

    #[tokio::test]
    async fn extend_pushes_out_expiry() {
        let mgr = manager();
        let id = mgr.allocate(None, 1, None).await.unwrap();
        let before = mgr.get(&id).await.unwrap().unwrap().expires_at;
        mgr.extend(&id, 1000).await.unwrap();
        let after = mgr.get(&id).await.unwrap().unwrap().expires_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn canonical_prefix_shape() {
        let mgr = manager();
        assert_eq!(mgr.canonical_prefix("s1"), "grid/sb1/sess-s1/");
    }
}
