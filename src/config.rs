use serde::Deserialize;
use std::fmt;

/// Environment variable consulted for the store credential. Takes precedence
/// over any credential found in the config file so secrets can stay out of
/// YAML entirely.
pub const CREDENTIAL_ENV_VAR: &str = "MIMIR_REDIS_PASSWORD";

/// Opaque credential wrapper. The value is redacted from `Debug` output so a
/// logged config can never leak the store password.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value. Only the connector building the store URL
    /// should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Resolved connection parameters for the remote store plus the resilience
/// knobs (TTL, backoff limits, fallback capacity). Immutable after
/// construction; `validate()` runs on every load path.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub credential: Option<Secret>,
    /// Default expiry applied to `set` operations, in whole seconds.
    /// Zero is rejected at validation; there is no "no expiry" mode.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u32,
    /// Bound on a single connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// When true, exhausting the retry budget keeps reconnecting at the
    /// capped delay instead of parking in the permanently-failed state.
    #[serde(default)]
    pub retry_forever: bool,
    /// Maximum entry count for the in-memory fallback store; `None` disables
    /// the degraded-mode fallback entirely.
    #[serde(default)]
    pub fallback_capacity: Option<usize>,
}

// Defaults mirror a typical managed-Redis setup: 20 minute TTL, ten retries
// with linear growth from 50ms capped at 500ms.
fn default_port() -> u16 {
    6379
}
fn default_ttl_secs() -> u32 {
    1200
}
fn default_max_retries() -> u32 {
    10
}
fn default_base_delay_ms() -> u32 {
    50
}
fn default_max_delay_ms() -> u32 {
    500
}
fn default_connect_timeout_ms() -> u64 {
    1000
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub async fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string (useful for testing)
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: CacheConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_env_credential();
        config.validate()?;

        Ok(config)
    }

    /// Pull the credential from the environment when present. File-sourced
    /// credentials are kept only as a fallback.
    fn apply_env_credential(&mut self) {
        if let Ok(value) = std::env::var(CREDENTIAL_ENV_VAR) {
            if !value.is_empty() {
                self.credential = Some(Secret::new(value));
            }
        }
    }

    /// Validate configuration for values the connection layer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "port must be non-zero".to_string(),
            ));
        }
        if self.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "ttl_secs must be non-zero; entries without expiry are not supported".to_string(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "base_delay_ms must be non-zero".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Assemble the connection URL for the redis client, including the
    /// credential and TLS scheme when configured.
    pub fn redis_url(&self) -> String {
        let scheme = if self.use_tls { "rediss" } else { "redis" };
        match &self.credential {
            Some(secret) => format!(
                "{}://:{}@{}:{}",
                scheme,
                secret.expose(),
                self.host,
                self.port
            ),
            None => format!("{}://{}:{}", scheme, self.host, self.port),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
