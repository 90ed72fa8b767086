//! Pool configuration options

use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use esox_connectionpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_max_size(20)
///     .with_acquire_timeout(Duration::from_millis(250))
///     .with_retry_interval(Duration::from_millis(50));
///
/// assert_eq!(config.max_size, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum number of connections in circulation (ready or lent out)
    pub max_size: usize,

    /// How long `acquire` waits for a connection before giving up
    pub acquire_timeout: Duration,

    /// Pause between consecutive failed factory calls while callers are waiting
    pub retry_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections in circulation
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connectionpool::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_max_size(5);
    ///
    /// assert_eq!(config.max_size, 5);
    /// ```
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the acquisition timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the interval between factory retries
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Check that the configuration describes a usable pool
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connectionpool::{PoolConfig, PoolError};
    ///
    /// let config = PoolConfig::new().with_max_size(0);
    ///
    /// assert!(matches!(config.validate(), Err(PoolError::InvalidConfiguration(_))));
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_durations_are_valid() {
        let config = PoolConfig::new()
            .with_acquire_timeout(Duration::ZERO)
            .with_retry_interval(Duration::ZERO);
        assert!(config.validate().is_ok());
    }
}
