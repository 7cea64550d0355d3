//! Cross-sandbox artifact location index. Grounded directly on
//! `chuk_artifacts.federation.manager`/`.store`: exact key names, the
//! sadd-or-JSON-fallback set emulation, and the stats-counter accumulation
//! are ported 1:1 into this crate's `SessionProvider` abstraction.

use crate::error::{GridError, GridResult};
use crate::session::{json_set, SessionProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_FEDERATION_TTL_DAYS: u64 = 30;

fn artifact_key(artifact_id: &str) -> String {
    format!("federation:artifact:{artifact_id}")
}

fn session_key(session_id: &str) -> String {
    format!("federation:session:{session_id}")
}

fn sandbox_key(sandbox_id: &str) -> String {
    format!("federation:sandbox:{sandbox_id}")
}

const STATS_KEY: &str = "federation:stats";

/// The location of one artifact, as known to the federation index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationLocation {
    pub artifact_id: String,
    pub sandbox_id: String,
    pub session_id: Option<String>,
    pub grid_key: String,
    pub size: u64,
    pub mime: String,
    pub stored_at: DateTime<Utc>,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatsRecord {
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    counters: HashMap<String, u64>,
}

impl StatsRecord {
    fn seed() -> Self {
        let now = Utc::now();
        StatsRecord { created_at: now, last_updated: now, counters: HashMap::new() }
    }
}

/// Aggregate federation counters as reported by `stats()`.
#[derive(Debug, Clone, Serialize)]
pub struct FederationStats {
    pub total_artifacts: u64,
    pub total_sessions: u64,
    pub total_sandboxes: u64,
    pub artifacts_registered: u64,
    pub artifacts_unregistered: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// The raw cross-sandbox index: register/locate/unregister plus the
/// session/sandbox secondary indexes and stats counters.
pub struct FederationIndex {
    session: Arc<dyn SessionProvider>,
    ttl_seconds: u64,
}

impl FederationIndex {
    pub fn new(session: Arc<dyn SessionProvider>, federation_ttl_days: u64) -> Self {
        let ttl_days = if federation_ttl_days == 0 { DEFAULT_FEDERATION_TTL_DAYS } else { federation_ttl_days };
        FederationIndex { session, ttl_seconds: ttl_days * 86_400 }
    }

    async fn update_stats(&self, counter: &str, delta: i64) -> GridResult<()> {
        let mut stats = match self.session.get(STATS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => StatsRecord::seed(),
        };
        let entry = stats.counters.entry(counter.to_string()).or_insert(0);
        *entry = (*entry as i64 + delta).max(0) as u64;
        stats.last_updated = Utc::now();
        let encoded = serde_json::to_string(&stats)?;
        self.session.setex(STATS_KEY, self.ttl_seconds, &encoded).await
    }

    /// Registers an artifact's location, updating the session and sandbox
    /// secondary indexes. Best-effort: callers (the `ArtifactStore`
    /// coordinator) log and swallow errors from this call rather than fail
    /// the primary `store` operation.
    pub async fn register(&self, location: &FederationLocation) -> GridResult<()> {
        let encoded = serde_json::to_string(location)?;
        self.session.setex(&artifact_key(&location.artifact_id), self.ttl_seconds, &encoded).await?;

        if let Some(session_id) = &location.session_id {
            json_set::add(self.session.as_ref(), &session_key(session_id), &location.artifact_id, self.ttl_seconds).await?;
        }
        json_set::add(self.session.as_ref(), &sandbox_key(&location.sandbox_id), &location.artifact_id, self.ttl_seconds).await?;

        self.update_stats("artifacts_registered", 1).await
    }

    pub async fn locate(&self, artifact_id: &str) -> GridResult<Option<FederationLocation>> {
        match self.session.get(&artifact_key(artifact_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Removes an artifact's location and secondary-index membership.
    /// Returns `false` if the artifact wasn't registered.
    pub async fn unregister(&self, artifact_id: &str) -> GridResult<bool> {
        let Some(location) = self.locate(artifact_id).await? else {
            return Ok(false);
        };
        self.session.delete(&artifact_key(artifact_id)).await?;
        if let Some(session_id) = &location.session_id {
            json_set::remove(self.session.as_ref(), &session_key(session_id), artifact_id, self.ttl_seconds).await?;
        }
        json_set::remove(self.session.as_ref(), &sandbox_key(&location.sandbox_id), artifact_id, self.ttl_seconds).await?;
        self.update_stats("artifacts_unregistered", 1).await?;
        Ok(true)
    }

    async fn dereference(&self, ids: impl IntoIterator<Item = String>) -> GridResult<Vec<FederationLocation>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(location) = self.locate(&id).await? {
                out.push(location);
            }
        }
        Ok(out)
    }

    pub async fn list_session_locations(&self, session_id: &str) -> GridResult<Vec<FederationLocation>> {
        let ids = json_set::get(self.session.as_ref(), &session_key(session_id)).await?.unwrap_or_default();
        self.dereference(ids).await
    }

    pub async fn sandbox_artifacts(&self, sandbox_id: &str, limit: usize) -> GridResult<Vec<FederationLocation>> {
        let ids: Vec<String> = json_set::get(self.session.as_ref(), &sandbox_key(sandbox_id))
            .await?
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect();
        self.dereference(ids).await
    }

    /// Best-effort aggregate counters. `total_*` counts come from live
    /// enumeration when the provider supports it, else fall back to 0.
    pub async fn stats(&self) -> GridResult<FederationStats> {
        let stats = match self.session.get(STATS_KEY).await? {
            Some(raw) => serde_json::from_str::<StatsRecord>(&raw)?,
            None => StatsRecord::seed(),
        };

        let (total_artifacts, total_sessions, total_sandboxes) = match self.session.keys("federation:artifact:").await? {
            Some(artifact_keys) => {
                let session_keys = self.session.keys("federation:session:").await?.unwrap_or_default();
                let sandbox_keys = self.session.keys("federation:sandbox:").await?.unwrap_or_default();
                (artifact_keys.len() as u64, session_keys.len() as u64, sandbox_keys.len() as u64)
            }
            None => (0, 0, 0),
        };

        Ok(FederationStats {
            total_artifacts,
            total_sessions,
            total_sandboxes,
            artifacts_registered: *stats.counters.get("artifacts_registered").unwrap_or(&0),
            artifacts_unregistered: *stats.counters.get("artifacts_unregistered").unwrap_or(&0),
            created_at: stats.created_at,
            last_updated: stats.last_updated,
            timestamp: Utc::now(),
        })
    }
}

/// Per-sandbox view over a `FederationIndex`, adding the supplemented
/// distribution-analysis operations described in `SPEC_FULL.md` §4.6.1.
pub struct FederationManager {
    index: FederationIndex,
    current_sandbox_id: String,
}

impl FederationManager {
    pub fn new(session: Arc<dyn SessionProvider>, current_sandbox_id: impl Into<String>, federation_ttl_days: u64) -> Self {
        FederationManager { index: FederationIndex::new(session, federation_ttl_days), current_sandbox_id: current_sandbox_id.into() }
    }

    pub fn index(&self) -> &FederationIndex {
        &self.index
    }

    pub async fn session_distribution(&self, session_id: &str) -> GridResult<HashMap<String, Vec<String>>> {
        let locations = self.index.list_session_locations(session_id).await?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for location in locations {
            map.entry(location.sandbox_id).or_default().push(location.artifact_id);
        }
        Ok(map)
    }

    pub async fn find_session_home_sandbox(&self, session_id: &str) -> GridResult<Option<String>> {
        let distribution = self.session_distribution(session_id).await?;
        Ok(distribution
            .into_iter()
            .max_by_key(|(_, artifacts)| artifacts.len())
            .map(|(sandbox_id, _)| sandbox_id))
    }

    pub fn current_sandbox_id(&self) -> &str {
        &self.current_sandbox_id
    }
}

/// Where an artifact's location claim originated, per
/// `ArtifactStore::locate_artifact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocatedArtifact {
    pub sandbox_id: String,
    pub session_id: Option<String>,
    pub grid_key: Option<String>,
    pub size: Option<u64>,
    pub mime: Option<String>,
    pub stored_at: Option<DateTime<Utc>>,
    pub source: LocationSource,
}

impl FederationManager {
    /// Resolves `artifact_id` either locally (if `local` is `Some`) or via
    /// the federation index. `local` short-circuits without consulting the
    /// index, matching `source=local` in §4.6.1.
    pub async fn locate_artifact(
        &self,
        artifact_id: &str,
        local: Option<&crate::metadata::ArtifactMetadata>,
    ) -> GridResult<Option<LocatedArtifact>> {
        if let Some(meta) = local {
            return Ok(Some(LocatedArtifact {
                sandbox_id: meta.sandbox_id.clone(),
                session_id: meta.session_id.clone(),
                grid_key: Some(meta.key.clone()),
                size: Some(meta.bytes),
                mime: Some(meta.mime.clone()),
                stored_at: Some(meta.stored_at),
                source: LocationSource::Local,
            }));
        }

        match self.index.locate(artifact_id).await? {
            Some(location) => Ok(Some(LocatedArtifact {
                sandbox_id: location.sandbox_id,
                session_id: location.session_id,
                grid_key: Some(location.grid_key),
                size: Some(location.size),
                mime: Some(location.mime),
                stored_at: Some(location.stored_at),
                source: LocationSource::Remote,
            })),
            None => Ok(None),
        }
    }
}

/// Swallows a federation-index error at the exact call site this policy
/// applies to (`store`/`delete` registration), per §7: federation errors
/// are logged and never surfaced to the caller of the primary operation.
pub fn log_federation_error(context: &str, err: GridError) {
    tracing::warn!(context, error = %err, "federation index operation failed; ignoring");
}
