use super::{ObjectInfo, StorageProvider};
use crate::error::{GridError, GridResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// A single-file `vfs-sqlite` storage provider: one row per object, giving
/// the same put/get/head/delete/list/copy contract as the other adapters
/// without depending on host filesystem directory semantics. Grounded on
/// the single-file-database shape described for the VFS filesystem
/// provider in the original implementation's diagnostics.
pub struct SqliteStorageProvider {
    conn: Mutex<Connection>,
}

impl SqliteStorageProvider {
    pub fn open(path: &str) -> GridResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| GridError::ConfigurationError(format!("failed to open vfs-sqlite database '{path}': {e}")))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS objects (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                content_type TEXT,
                size INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| GridError::ConfigurationError(format!("failed to initialize vfs-sqlite schema: {e}")))?;
        Ok(SqliteStorageProvider { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl StorageProvider for SqliteStorageProvider {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> GridResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO objects (key, value, content_type, size, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET value = ?2, content_type = ?3, size = ?4, updated_at = ?5",
            params![key, data.as_ref(), content_type, data.len() as i64, Utc::now().to_rfc3339()],
        )
        .map_err(|e| GridError::ProviderError(format!("vfs-sqlite put failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> GridResult<Bytes> {
        let conn = self.conn.lock().unwrap();
        let data: Vec<u8> = conn
            .query_row("SELECT value FROM objects WHERE key = ?1", params![key], |row| row.get(0))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => GridError::ArtifactNotFound(key.to_string()),
                other => GridError::ProviderError(format!("vfs-sqlite get failed: {other}")),
            })?;
        Ok(Bytes::from(data))
    }

    async fn head(&self, key: &str) -> GridResult<ObjectInfo> {
        let conn = self.conn.lock().unwrap();
        let (size, content_type): (i64, Option<String>) = conn
            .query_row(
                "SELECT size, content_type FROM objects WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => GridError::ArtifactNotFound(key.to_string()),
                other => GridError::ProviderError(format!("vfs-sqlite head failed: {other}")),
            })?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: size as u64,
            content_type,
        })
    }

    async fn delete(&self, key: &str) -> GridResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM objects WHERE key = ?1", params![key])
            .map_err(|e| GridError::ProviderError(format!("vfs-sqlite delete failed: {e}")))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> GridResult<Vec<ObjectInfo>> {
        let conn = self.conn.lock().unwrap();
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let like_pattern = format!("{escaped}%");
        let mut stmt = conn
            .prepare("SELECT key, size, content_type FROM objects WHERE key LIKE ?1 ESCAPE '\\'")
            .map_err(|e| GridError::ProviderError(format!("vfs-sqlite list failed: {e}")))?;
        let rows = stmt
            .query_map(params![like_pattern], |row| {
                let key: String = row.get(0)?;
                let size: i64 = row.get(1)?;
                let content_type: Option<String> = row.get(2)?;
                Ok(ObjectInfo { key, size: size as u64, content_type })
            })
            .map_err(|e| GridError::ProviderError(format!("vfs-sqlite list failed: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| GridError::ProviderError(format!("vfs-sqlite list row failed: {e}")))?);
        }
        Ok(out)
    }

    async fn copy(&self, from: &str, to: &str) -> GridResult<()> {
        let data = self.get(from).await?;
        let content_type = self.head(from).await?.content_type.unwrap_or_default();
        self.put(to, data, &content_type).await
    }

    fn provider_name(&self) -> &'static str {
        "vfs-sqlite"
    }
}
