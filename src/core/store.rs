use crate::config::CacheConfig;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

/// Core trait for a live store handle. Implementations must be safe for
/// concurrent use; the manager hands the same handle to every caller.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the raw bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// Store `value` under `key` with the given expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), TransportError>;

    /// Remove `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), TransportError>;
}

/// Factory for store handles. One connect call yields one handle; the
/// connection manager decides when to call it and what to do on failure.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Store>, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Connector for a Redis-compatible store.
pub struct RedisConnector {
    url: String,
}

impl RedisConnector {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            url: config.redis_url(),
        }
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn Store>, TransportError> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Arc::new(RedisStore { conn }) as Arc<dyn Store>)
    }
}

/// Store handle backed by a multiplexed Redis connection. The inner
/// connection is cheap to clone and multiplexes concurrent commands over one
/// socket, which keeps the single-connection semantics of the manager.
pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| TransportError::OperationFailed(e.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| TransportError::OperationFailed(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| TransportError::OperationFailed(e.to_string()))
    }
}
