//! Propagation configuration (defaults + environment overrides).

use std::time::Duration;

use thiserror::Error;

use crate::cleanup::DEFAULT_PAGE_SIZE;
use crate::retry::RetryPolicy;

pub const ENV_RETRY_MAX_ATTEMPTS: &str = "EDUTRACK_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "EDUTRACK_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "EDUTRACK_RETRY_MAX_DELAY_MS";
pub const ENV_CLEANUP_PAGE_SIZE: &str = "EDUTRACK_CLEANUP_PAGE_SIZE";
pub const ENV_DISPATCH_DEADLINE_MS: &str = "EDUTRACK_DISPATCH_DEADLINE_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a positive integer, got '{value}'")]
    NotPositive { var: &'static str, value: String },
}

/// Knobs of the propagation core.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    /// In-delivery retry policy for transient store errors.
    pub retry: RetryPolicy,
    /// Page size of cascading cleanup queries.
    pub cleanup_page_size: usize,
    /// Wall-clock budget of one dispatch, retries included.
    pub dispatch_deadline: Duration,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cleanup_page_size: DEFAULT_PAGE_SIZE,
            dispatch_deadline: Duration::from_secs(60),
        }
    }
}

impl PropagationConfig {
    /// Defaults overridden by `EDUTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let positive = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(n) if n > 0 => Ok(Some(n)),
                    _ => Err(ConfigError::NotPositive { var, value: raw }),
                },
            }
        };

        let mut config = Self::default();
        if let Some(n) = positive(ENV_RETRY_MAX_ATTEMPTS)? {
            config.retry.max_attempts = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(ms) = positive(ENV_RETRY_BASE_DELAY_MS)? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = positive(ENV_RETRY_MAX_DELAY_MS)? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = positive(ENV_CLEANUP_PAGE_SIZE)? {
            config.cleanup_page_size = usize::try_from(n).unwrap_or(usize::MAX);
        }
        if let Some(ms) = positive(ENV_DISPATCH_DEADLINE_MS)? {
            config.dispatch_deadline = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cleanup_page_size(mut self, page_size: usize) -> Self {
        self.cleanup_page_size = page_size;
        self
    }

    pub fn with_dispatch_deadline(mut self, deadline: Duration) -> Self {
        self.dispatch_deadline = deadline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let env = HashMap::from([
            (ENV_RETRY_MAX_ATTEMPTS, "7"),
            (ENV_CLEANUP_PAGE_SIZE, "25"),
        ]);
        let config = PropagationConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.cleanup_page_size, 25);
        assert_eq!(config.dispatch_deadline, PropagationConfig::default().dispatch_deadline);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        let zero = PropagationConfig::from_lookup(|k| (k == ENV_CLEANUP_PAGE_SIZE).then(|| "0".to_string()));
        assert_eq!(
            zero.unwrap_err(),
            ConfigError::NotPositive {
                var: ENV_CLEANUP_PAGE_SIZE,
                value: "0".to_string()
            }
        );

        let garbage = PropagationConfig::from_lookup(|k| (k == ENV_DISPATCH_DEADLINE_MS).then(|| "soon".to_string()));
        assert!(garbage.is_err());
    }
}
