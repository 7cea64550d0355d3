mod manager;
mod memory;
#[cfg(feature = "redis")]
mod redis_provider;

pub use manager::{SessionInfo, SessionManager};
pub use memory::MemorySessionProvider;
#[cfg(feature = "redis")]
pub use redis_provider::RedisSessionProvider;

use crate::config::SessionProviderConfig;
use crate::error::GridResult;
use async_trait::async_trait;
use std::sync::Arc;

/// TTL key-value abstraction backing sessions, artifact metadata, and the
/// federation index. Implementations need only support `get`/`setex`/
/// `delete`; `keys` and the set primitives are optional capability hooks.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get(&self, key: &str) -> GridResult<Option<String>>;
    async fn setex(&self, key: &str, ttl_seconds: u64, value: &str) -> GridResult<()>;
    async fn delete(&self, key: &str) -> GridResult<()>;

    /// Returns all keys with the given prefix, if the provider supports
    /// enumeration. `None` means "not supported"; callers fall back to
    /// a provider-maintained secondary index in that case.
    async fn keys(&self, _prefix: &str) -> GridResult<Option<Vec<String>>> {
        Ok(None)
    }

    /// Native set-add, if the provider supports sets. `Ok(false)` means
    /// "not supported"; callers fall back to JSON-encoded list emulation.
    async fn sadd(&self, _key: &str, _member: &str) -> GridResult<bool> {
        Ok(false)
    }

    async fn srem(&self, _key: &str, _member: &str) -> GridResult<bool> {
        Ok(false)
    }

    async fn smembers(&self, _key: &str) -> GridResult<Option<Vec<String>>> {
        Ok(None)
    }

    /// Whether this provider implements native set operations at all
    /// (distinguishes "set is empty" from "sets unsupported").
    fn supports_native_sets(&self) -> bool {
        false
    }
}

/// Builds a `SessionProvider` from configuration.
pub fn build_session_provider(config: &SessionProviderConfig) -> GridResult<Arc<dyn SessionProvider>> {
    match config {
        SessionProviderConfig::Memory => Ok(Arc::new(MemorySessionProvider::new())),
        #[cfg(feature = "redis")]
        SessionProviderConfig::Redis { url } => {
            Ok(Arc::new(RedisSessionProvider::new(url)?))
        }
        #[cfg(not(feature = "redis"))]
        SessionProviderConfig::Redis { .. } => Err(crate::error::GridError::ConfigurationError(
            "redis session provider requested but the 'redis' feature is not enabled".into(),
        )),
    }
}

/// JSON-encoded-list fallback helpers for providers without native sets,
/// mirroring the `_add_to_json_set`/`_remove_from_json_set`/`_get_json_set`
/// behavior this crate's federation index is grounded on.
pub(crate) mod json_set {
    use super::SessionProvider;
    use crate::error::GridResult;
    use std::collections::HashSet;

    pub async fn add(provider: &dyn SessionProvider, key: &str, member: &str, ttl_seconds: u64) -> GridResult<()> {
        if provider.supports_native_sets() {
            provider.sadd(key, member).await?;
            return Ok(());
        }
        let mut set = get(provider, key).await?.unwrap_or_default();
        set.insert(member.to_string());
        let encoded = serde_json::to_string(&set)?;
        provider.setex(key, ttl_seconds, &encoded).await
    }

    pub async fn remove(provider: &dyn SessionProvider, key: &str, member: &str, ttl_seconds: u64) -> GridResult<()> {
        if provider.supports_native_sets() {
            provider.srem(key, member).await?;
            return Ok(());
        }
        let Some(mut set) = get(provider, key).await? else {
            return Ok(());
        };
        set.remove(member);
        let encoded = serde_json::to_string(&set)?;
        provider.setex(key, ttl_seconds, &encoded).await
    }

    pub async fn get(provider: &dyn SessionProvider, key: &str) -> GridResult<Option<HashSet<String>>> {
        if provider.supports_native_sets() {
            return Ok(provider.smembers(key).await?.map(|v| v.into_iter().collect()));
        }
        match provider.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
