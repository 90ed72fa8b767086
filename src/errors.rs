//! Error types for the connection pool

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced at the public boundary of the pool.
///
/// Factory failures never show up here: they are absorbed by the background
/// top-up and only slow down replenishment, which callers observe as a
/// [`PoolError::Timeout`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Pool must be created from within a tokio runtime")]
    NoRuntime,

    #[error("Metrics export failed: {0}")]
    Metrics(String),
}

impl PoolError {
    /// Whether this error is an acquisition timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
