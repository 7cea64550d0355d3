use super::SessionProvider;
use crate::error::GridResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-wide, in-memory `SessionProvider`. Native sets and `keys()`
/// enumeration are both supported since the backing map is directly
/// scannable.
pub struct MemorySessionProvider {
    data: DashMap<String, Entry>,
    sets: DashMap<String, std::collections::HashSet<String>>,
}

impl MemorySessionProvider {
    pub fn new() -> Self {
        MemorySessionProvider {
            data: DashMap::new(),
            sets: DashMap::new(),
        }
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at > Utc::now()
    }
}

impl Default for MemorySessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for MemorySessionProvider {
    async fn get(&self, key: &str) -> GridResult<Option<String>> {
        let live = match self.data.get(key) {
            Some(entry) if Self::is_live(&entry) => return Ok(Some(entry.value.clone())),
            Some(_) => false,
            None => return Ok(None),
        };
        if !live {
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn setex(&self, key: &str, ttl_seconds: u64, value: &str) -> GridResult<()> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
        self.data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> GridResult<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> GridResult<Option<Vec<String>>> {
        let now = Utc::now();
        let matched = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().expires_at > now)
            .map(|entry| entry.key().clone())
            .collect();
        Ok(Some(matched))
    }

    async fn sadd(&self, key: &str, member: &str) -> GridResult<bool> {
        self.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(true)
    }

    async fn srem(&self, key: &str, member: &str) -> GridResult<bool> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(true)
    }

    async fn smembers(&self, key: &str) -> GridResult<Option<Vec<String>>> {
        Ok(Some(
            self.sets
                .get(key)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default(),
        ))
    }

    fn supports_native_sets(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setex_then_get_roundtrips() {
        let provider = MemorySessionProvider::new();
        provider.setex("k", 60, "v").await.unwrap();
        assert_eq!(provider.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_absent() {
        let provider = MemorySessionProvider::new();
        provider.setex("k", 0, "v").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(provider.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let provider = MemorySessionProvider::new();
        provider.setex("k", 60, "v").await.unwrap();
        provider.delete("k").await.unwrap();
        assert_eq!(provider.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sets_add_remove_members() {
        let provider = MemorySessionProvider::new();
        provider.sadd("set", "a").await.unwrap();
        provider.sadd("set", "b").await.unwrap();
        let mut members = provider.smembers("set").await.unwrap().unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
        provider.srem("set", "a").await.unwrap();
        assert_eq!(provider.smembers("set").await.unwrap().unwrap(), vec!["b".to_string()]);
    }
}
