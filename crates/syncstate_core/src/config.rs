//! Configuration for the coordination layer.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// Environment variable overriding [`RetryConfig::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "SYNCSTATE_MAX_ATTEMPTS";
/// Environment variable overriding [`RetryConfig::initial_delay`], in ms.
pub const ENV_RETRY_DELAY_MS: &str = "SYNCSTATE_RETRY_DELAY_MS";
/// Environment variable overriding [`SyncStateConfig::default_timeout`], in ms.
pub const ENV_TIMEOUT_MS: &str = "SYNCSTATE_TIMEOUT_MS";

/// Configuration for a [`crate::SyncStateManager`].
#[derive(Debug, Clone)]
pub struct SyncStateConfig {
    /// Retry behaviour on version conflicts.
    pub retry: RetryConfig,
    /// Deadline applied by [`crate::OpContext::from_config`].
    pub default_timeout: Duration,
}

impl SyncStateConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            default_timeout: Duration::from_secs(30),
        }
    }

    /// Builds a configuration from defaults overridden by environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set but not a number.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration using `lookup` to read settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a setting is present but not a number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let mut config = Self::new();

        if let Some(attempts) = parse_setting::<u32>(&lookup, ENV_MAX_ATTEMPTS)? {
            if attempts == 0 {
                return Err(CoreError::InvalidConfig {
                    key: ENV_MAX_ATTEMPTS.to_string(),
                    message: "must be at least 1".into(),
                });
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_setting::<u64>(&lookup, ENV_RETRY_DELAY_MS)? {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_setting::<u64>(&lookup, ENV_TIMEOUT_MS)? {
            config.default_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the default operation timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for SyncStateConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_setting<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> CoreResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CoreError::InvalidConfig {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

/// Configuration for conflict retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of write attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
    /// Fraction of the delay added as random jitter (0.0 disables).
    pub jitter: f64,
}

impl RetryConfig {
    /// Creates a configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            jitter: 0.1,
        }
    }

    /// Creates a configuration that writes once and never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Attempt budget actually used. A budget of zero still makes one
    /// attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter > 0.0 {
            Duration::from_secs_f64(capped + capped * self.jitter * jitter_fraction())
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Cheap pseudo-random fraction in `[0, 1)` taken from the clock.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
