//! Engine configuration.

use std::time::Duration;
use uuid::Uuid;

/// Configuration for remote-call retry behavior.
///
/// Backoff is linear: attempt `n` waits `n × base_delay`. Only
/// transient/network-classified errors are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay unit for the linear backoff.
    pub base_delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Calculates the delay before the given retry attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for an engine session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identifier of this session; used for realtime echo suppression.
    pub session_id: String,
    /// Inactivity timeout after which an edit lock auto-releases.
    pub lock_timeout: Duration,
    /// How long to wait for a realtime subscription acknowledgment.
    pub subscribe_timeout: Duration,
    /// How long an ephemeral broadcast hint stays visible.
    pub hint_ttl: Duration,
    /// Remote-call retry behavior.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Creates a configuration with a fresh session id.
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            lock_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(10),
            hint_ttl: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the edit-lock inactivity timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the realtime subscribe timeout.
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Sets the broadcast hint time-to-live.
    pub fn with_hint_ttl(mut self, ttl: Duration) -> Self {
        self.hint_ttl = ttl;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(3));
    }

    #[test]
    fn no_retry_config() {
        let retry = RetryConfig::no_retry();
        assert_eq!(retry.max_attempts, 1);
    }

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_session_id("session-a")
            .with_lock_timeout(Duration::from_secs(10))
            .with_hint_ttl(Duration::from_secs(2));

        assert_eq!(config.session_id, "session-a");
        assert_eq!(config.lock_timeout, Duration::from_secs(10));
        assert_eq!(config.hint_ttl, Duration::from_secs(2));
    }

    #[test]
    fn default_session_ids_are_unique() {
        assert_ne!(EngineConfig::new().session_id, EngineConfig::new().session_id);
    }
}
