use async_trait::async_trait;
use lazy_static::lazy_static;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Expiring key-value store for short-lived secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    #[allow(dead_code)]
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Deletes `key` only while it still holds `expected`. Returns whether it did.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError>;
}

lazy_static! {
    static ref COMPARE_AND_DELETE: Script = Script::new(
        r#"
        if redis.call("GET", KEYS[1]) == ARGV[1] then
            return redis.call("DEL", KEYS[1])
        end
        return 0
        "#,
    );
}

#[derive(Clone)]
pub struct RedisSecretStore {
    connection: MultiplexedConnection,
}

impl RedisSecretStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("connected to redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl SecretStore for RedisSecretStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        debug!(key, ttl_seconds, "secret stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let removed: i64 = COMPARE_AND_DELETE
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }
}
