use crate::config::CacheConfig;
use crate::core::fallback::FallbackStore;
use crate::core::manager::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a successful `set` was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Written to the remote store with expiry.
    Stored,
    /// Remote store unreachable; written to the in-memory fallback instead.
    Degraded,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable and no fallback configured")]
    Unavailable,
    #[error("TTL must be a non-zero whole-second duration")]
    InvalidTtl,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Public get/set/delete surface. Values are JSON-serialized; every call
/// acquires a fresh handle from the manager (handles are never cached across
/// calls), fails fast on transport errors, and consults the fallback store
/// when one is configured.
pub struct CacheClient {
    manager: Arc<ConnectionManager>,
    default_ttl: Duration,
    fallback: Option<FallbackStore>,
}

impl CacheClient {
    pub fn new(
        manager: Arc<ConnectionManager>,
        default_ttl: Duration,
        fallback: Option<FallbackStore>,
    ) -> Self {
        Self {
            manager,
            default_ttl,
            fallback,
        }
    }

    pub fn from_config(manager: Arc<ConnectionManager>, config: &CacheConfig) -> Self {
        Self::new(
            manager,
            Duration::from_secs(config.ttl_secs as u64),
            config.fallback_capacity.map(FallbackStore::new),
        )
    }

    /// Store `value` under `key` with `ttl_override` or the configured
    /// default. Degrades to the fallback store when the remote store is
    /// unreachable; a transport error mid-write also hands the connection
    /// back to the manager for recovery. No per-call retries.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_override: Option<Duration>,
    ) -> Result<SetOutcome, CacheError> {
        let ttl = self.resolve_ttl(ttl_override)?;
        let bytes = serde_json::to_vec(value)?;

        match self.manager.acquire() {
            Ok(store) => match store.set(key, &bytes, ttl).await {
                Ok(()) => {
                    debug!("cache set for key '{}' (ttl {:?})", key, ttl);
                    Ok(SetOutcome::Stored)
                }
                Err(e) => {
                    warn!("cache set failed for key '{}': {}", key, e);
                    self.manager.report_transport_error();
                    self.degraded_set(key, bytes, ttl)
                }
            },
            Err(e) => {
                debug!("cache set for key '{}' while {}; using fallback path", key, e);
                self.degraded_set(key, bytes, ttl)
            }
        }
    }

    /// Fetch and deserialize the value under `key`. `Ok(None)` means the key
    /// is absent, never an error. Reads the fallback store when the remote
    /// store is unreachable and a fallback is configured.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.manager.acquire() {
            Ok(store) => match store.get(key).await {
                Ok(Some(bytes)) => {
                    debug!("cache hit for key '{}'", key);
                    Ok(Some(serde_json::from_slice(&bytes)?))
                }
                Ok(None) => {
                    debug!("cache miss for key '{}'", key);
                    Ok(None)
                }
                Err(e) => {
                    warn!("cache get failed for key '{}': {}", key, e);
                    self.manager.report_transport_error();
                    self.degraded_get(key)
                }
            },
            Err(e) => {
                debug!("cache get for key '{}' while {}; using fallback path", key, e);
                self.degraded_get(key)
            }
        }
    }

    /// Best-effort delete against both the remote store and the fallback.
    /// Deleting an absent key succeeds; the call only fails when neither
    /// store could be reached at all.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let fallback_touched = match &self.fallback {
            Some(fallback) => {
                fallback.remove(key);
                true
            }
            None => false,
        };

        match self.manager.acquire() {
            Ok(store) => match store.delete(key).await {
                Ok(()) => {
                    debug!("cache delete for key '{}'", key);
                    Ok(())
                }
                Err(e) => {
                    warn!("cache delete failed for key '{}': {}", key, e);
                    self.manager.report_transport_error();
                    if fallback_touched {
                        Ok(())
                    } else {
                        Err(CacheError::Unavailable)
                    }
                }
            },
            Err(_) if fallback_touched => Ok(()),
            Err(_) => Err(CacheError::Unavailable),
        }
    }

    fn resolve_ttl(&self, ttl_override: Option<Duration>) -> Result<Duration, CacheError> {
        match ttl_override {
            Some(ttl) if ttl.is_zero() => Err(CacheError::InvalidTtl),
            Some(ttl) => Ok(ttl),
            None => Ok(self.default_ttl),
        }
    }

    fn degraded_set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> Result<SetOutcome, CacheError> {
        match &self.fallback {
            Some(fallback) => {
                fallback.insert(key, bytes, ttl);
                debug!("degraded cache set for key '{}' into fallback store", key);
                Ok(SetOutcome::Degraded)
            }
            None => Err(CacheError::Unavailable),
        }
    }

    fn degraded_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match &self.fallback {
            Some(fallback) => match fallback.get(key) {
                Some(bytes) => {
                    debug!("degraded cache hit for key '{}' from fallback store", key);
                    Ok(Some(serde_json::from_slice(&bytes)?))
                }
                None => Ok(None),
            },
            None => Err(CacheError::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backoff::BackoffPolicy;
    use crate::core::store::{Connector, Store, TransportError};
    use async_trait::async_trait;

    struct NeverConnects;

    #[async_trait]
    impl Connector for NeverConnects {
        async fn connect(&self) -> Result<Arc<dyn Store>, TransportError> {
            Err(TransportError::ConnectionFailed("refused".to_string()))
        }
    }

    fn disconnected_client(fallback: Option<FallbackStore>) -> CacheClient {
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(NeverConnects),
            BackoffPolicy::new(1, 10, 20),
            Duration::from_millis(50),
        ));
        CacheClient::new(manager, Duration::from_secs(60), fallback)
    }

    #[tokio::test]
    async fn test_zero_ttl_override_rejected() {
        let client = disconnected_client(Some(FallbackStore::new(4)));
        let result = client.set("k", &"v", Some(Duration::ZERO)).await;
        assert!(matches!(result, Err(CacheError::InvalidTtl)));
    }

    #[tokio::test]
    async fn test_unavailable_without_fallback() {
        let client = disconnected_client(None);
        assert!(matches!(
            client.set("k", &"v", None).await,
            Err(CacheError::Unavailable)
        ));
        assert!(matches!(
            client.get::<String>("k").await,
            Err(CacheError::Unavailable)
        ));
        assert!(matches!(
            client.delete("k").await,
            Err(CacheError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_degraded_set_then_get_roundtrip() {
        let client = disconnected_client(Some(FallbackStore::new(4)));
        let outcome = client.set("a", &1u32, None).await.expect("degraded set");
        assert_eq!(outcome, SetOutcome::Degraded);
        assert_eq!(client.get::<u32>("a").await.expect("degraded get"), Some(1));
    }

    #[tokio::test]
    async fn test_degraded_delete_is_ok() {
        let client = disconnected_client(Some(FallbackStore::new(4)));
        client.set("a", &1u32, None).await.expect("degraded set");
        client.delete("a").await.expect("degraded delete");
        assert_eq!(client.get::<u32>("a").await.expect("degraded get"), None);
    }
}
