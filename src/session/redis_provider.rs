use super::SessionProvider;
use crate::error::{GridError, GridResult};
use async_trait::async_trait;
use redis::AsyncCommands;

/// `SessionProvider` backed by Redis. Method shape follows the
/// `RedisSessionStore`/`RedisMemoryStore` pattern: a cheap-to-clone
/// `redis::Client` and a single async connection pulled per call.
pub struct RedisSessionProvider {
    client: redis::Client,
}

impl RedisSessionProvider {
    pub fn new(url: &str) -> GridResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GridError::ConfigurationError(format!("invalid redis url: {e}")))?;
        Ok(RedisSessionProvider { client })
    }

    async fn conn(&self) -> GridResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| GridError::ProviderError(format!("redis connection failed: {e}")))
    }
}

#[async_trait]
impl SessionProvider for RedisSessionProvider {
    async fn get(&self, key: &str) -> GridResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis GET failed: {e}")))
    }

    async fn setex(&self, key: &str, ttl_seconds: u64, value: &str) -> GridResult<()> {
        let mut conn = self.conn().await?;
        let ttl = ttl_seconds.max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis SETEX failed: {e}")))
    }

    async fn delete(&self, key: &str) -> GridResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis DEL failed: {e}")))
    }

    async fn keys(&self, prefix: &str) -> GridResult<Option<Vec<String>>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis KEYS failed: {e}")))?;
        Ok(Some(keys))
    }

    async fn sadd(&self, key: &str, member: &str) -> GridResult<bool> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis SADD failed: {e}")))?;
        Ok(true)
    }

    async fn srem(&self, key: &str, member: &str) -> GridResult<bool> {
        let mut conn = self.conn().await?;
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis SREM failed: {e}")))?;
        Ok(true)
    }

    async fn smembers(&self, key: &str) -> GridResult<Option<Vec<String>>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn
            .smembers(key)
            .await
            .map_err(|e| GridError::ProviderError(format!("redis SMEMBERS failed: {e}")))?;
        Ok(Some(members))
    }

    fn supports_native_sets(&self) -> bool {
        true
    }
}
