//! Health reporting for connection pools

use crate::metrics::utilization;

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::HealthStatus;
///
/// let health = HealthStatus::new(1, 2, 0, 10, None);
/// assert!(health.is_healthy());
/// assert_eq!(health.available, 1);
///
/// let failing = HealthStatus::new(0, 1, 3, 10, Some("connection refused".to_string()));
/// assert!(!failing.is_healthy());
/// assert_eq!(failing.warning_count, 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Circulation relative to the maximum (0.0 to 1.0)
    pub utilization: f64,

    /// Connections ready to be handed out
    pub available: usize,

    /// Connections in circulation
    pub in_circulation: usize,

    /// Callers blocked in `acquire`
    pub waiters: usize,

    /// Configured maximum circulation
    pub max_size: usize,

    /// Message of the most recent factory failure, cleared by the next success
    pub last_factory_error: Option<String>,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(
        available: usize,
        in_circulation: usize,
        waiters: usize,
        max_size: usize,
        last_factory_error: Option<String>,
    ) -> Self {
        let utilization = utilization(in_circulation, max_size);

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if waiters > 0 && available == 0 {
            warnings.push(format!("{} caller(s) waiting with no connection ready", waiters));
        }

        if let Some(ref err) = last_factory_error {
            warnings.push(format!("Factory is failing: {}", err));
            is_healthy = false;
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available,
            in_circulation,
            waiters,
            max_size,
            last_factory_error,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
