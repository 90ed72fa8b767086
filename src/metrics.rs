//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{Connection, Pool, PoolConfig};
///
/// #[derive(Debug)]
/// struct Session;
///
/// impl Connection for Session {
///     fn is_unusable(&self) -> bool {
///         false
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(|| Ok::<_, String>(Session), PoolConfig::default()).unwrap();
///
/// {
///     let _conn = pool.acquire().await.unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_acquired, 1);
///     assert_eq!(metrics.max_size, 10);
/// }
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Connections successfully opened by the factory
    pub connections_created: usize,

    /// Connections dropped on release because they reported unusable
    pub connections_evicted: usize,

    /// Connections taken out of the pool by their borrower
    pub connections_detached: usize,

    /// Successful acquisitions
    pub total_acquired: usize,

    /// Connections handed back to the ready queue
    pub total_released: usize,

    /// Acquisitions that gave up after the timeout
    pub acquire_timeouts: usize,

    /// Failed factory calls
    pub factory_failures: usize,

    /// Top-ups that gave up because nobody was waiting any more
    pub abandoned_top_ups: usize,

    /// Connections in circulation (ready or lent out)
    pub in_circulation: usize,

    /// Connections ready to be handed out
    pub available: usize,

    /// Callers currently blocked in `acquire`
    pub waiters: usize,

    /// Configured maximum circulation
    pub max_size: usize,

    /// Circulation relative to the maximum (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("connections_created".to_string(), self.connections_created.to_string());
        metrics.insert("connections_evicted".to_string(), self.connections_evicted.to_string());
        metrics.insert("connections_detached".to_string(), self.connections_detached.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("acquire_timeouts".to_string(), self.acquire_timeouts.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("abandoned_top_ups".to_string(), self.abandoned_top_ups.to_string());
        metrics.insert("in_circulation".to_string(), self.in_circulation.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("waiters".to_string(), self.waiters.to_string());
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus the given tags.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new_custom(Some("connpool".to_string()), Some(labels))
            .map_err(metrics_error)?;

        let gauges = [
            ("connections_in_circulation", "Connections ready or lent out", metrics.in_circulation),
            ("connections_available", "Connections ready to be handed out", metrics.available),
            ("waiters", "Callers blocked waiting for a connection", metrics.waiters),
            ("max_size", "Configured maximum circulation", metrics.max_size),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(metrics_error)?;
        }

        let utilization = Gauge::with_opts(Opts::new("utilization", "Circulation relative to the maximum"))
            .map_err(metrics_error)?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization)).map_err(metrics_error)?;

        let counters = [
            ("connections_created_total", "Connections opened by the factory", metrics.connections_created),
            ("connections_evicted_total", "Unusable connections dropped on release", metrics.connections_evicted),
            ("connections_detached_total", "Connections taken out of the pool", metrics.connections_detached),
            ("acquired_total", "Successful acquisitions", metrics.total_acquired),
            ("released_total", "Connections returned to the ready queue", metrics.total_released),
            ("acquire_timeouts_total", "Acquisitions that timed out", metrics.acquire_timeouts),
            ("factory_failures_total", "Failed factory calls", metrics.factory_failures),
            ("abandoned_top_ups_total", "Top-ups abandoned without waiters", metrics.abandoned_top_ups),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(metrics_error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(metrics_error)
    }
}

#[cfg(feature = "metrics")]
fn metrics_error(err: impl std::fmt::Display) -> crate::PoolError {
    crate::PoolError::Metrics(err.to_string())
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub connections_created: AtomicUsize,
    pub connections_evicted: AtomicUsize,
    pub connections_detached: AtomicUsize,
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub acquire_timeouts: AtomicUsize,
    pub factory_failures: AtomicUsize,
    pub abandoned_top_ups: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(
        &self,
        in_circulation: usize,
        available: usize,
        waiters: usize,
        max_size: usize,
    ) -> PoolMetrics {
        PoolMetrics {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            connections_detached: self.connections_detached.load(Ordering::Relaxed),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            abandoned_top_ups: self.abandoned_top_ups.load(Ordering::Relaxed),
            in_circulation,
            available,
            waiters,
            max_size,
            utilization: utilization(in_circulation, max_size),
        }
    }
}

pub(crate) fn utilization(in_circulation: usize, max_size: usize) -> f64 {
    if max_size > 0 {
        (in_circulation as f64 / max_size as f64).min(1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.connections_created);
        MetricsTracker::record(&tracker.connections_created);
        MetricsTracker::record(&tracker.acquire_timeouts);

        let metrics = tracker.get_metrics(2, 1, 0, 4);
        assert_eq!(metrics.connections_created, 2);
        assert_eq!(metrics.acquire_timeouts, 1);
        assert_eq!(metrics.utilization, 0.5);

        let exported = metrics.export();
        assert_eq!(exported["connections_created"], "2");
        assert_eq!(exported["utilization"], "0.50");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export_carries_labels() {
        let metrics = MetricsTracker::new().get_metrics(3, 1, 2, 10);

        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "api".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "db", Some(&tags)).unwrap();
        assert!(output.contains("# TYPE connpool_connections_in_circulation gauge"));
        assert!(output.contains("# TYPE connpool_factory_failures_total counter"));
        assert!(output.contains("pool=\"db\""));
        assert!(output.contains("service=\"api\""));
    }
}
