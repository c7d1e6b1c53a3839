pub mod config;
pub mod core;

// Re-export main components for easy access
pub use crate::config::{CacheConfig, ConfigError, Secret};
pub use crate::core::*;
