pub mod backoff;
pub mod client;
pub mod fallback;
pub mod manager;
pub mod store;

// Re-export core types
pub use backoff::{Backoff, BackoffPolicy};
pub use client::{CacheClient, CacheError, SetOutcome};
pub use fallback::FallbackStore;
pub use manager::{ConnectionEvent, ConnectionManager, ConnectionState, ManagerError, RetryCounter};
pub use store::{Connector, RedisConnector, RedisStore, Store, TransportError};
