use crate::config::CacheConfig;
use std::time::Duration;

/// Outcome of consulting the policy for a retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long before the next connect attempt.
    Delay(Duration),
    /// Retry budget exhausted; the connection manager must stop reconnecting.
    PermanentFailure,
}

/// Linear-capped backoff: `min(base * attempt, max)`, deterministic, no
/// jitter. Pure and stateless; the manager owns the attempt counter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    retry_forever: bool,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u32, max_delay_ms: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms as u64),
            max_delay: Duration::from_millis(max_delay_ms as u64),
            retry_forever: false,
        }
    }

    /// Keep retrying at the capped delay instead of giving up once the
    /// budget is spent.
    pub fn retry_forever(mut self) -> Self {
        self.retry_forever = true;
        self
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let policy = Self::new(
            config.max_retries,
            config.base_delay_ms,
            config.max_delay_ms,
        );
        if config.retry_forever {
            policy.retry_forever()
        } else {
            policy
        }
    }

    /// Delay before connect attempt number `attempt` (1-based: the first
    /// failed attempt asks with `attempt == 1`).
    pub fn next_delay(&self, attempt: u32) -> Backoff {
        if attempt > self.max_retries && !self.retry_forever {
            return Backoff::PermanentFailure;
        }
        let scaled = self.base_delay.saturating_mul(attempt).min(self.max_delay);
        Backoff::Delay(scaled)
    }
}
