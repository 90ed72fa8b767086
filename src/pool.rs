//! Core connection pool implementation

use crate::config::PoolConfig;
use crate::connection::{Connection, ConnectionFactory};
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Deadline used when the configured timeout does not fit into an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// A connection lent out by a [`Pool`].
///
/// Dereferences to the underlying connection. Dropping it hands the
/// connection back to the pool it came from, where it is either queued for
/// the next caller or evicted if it reports itself unusable.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    pool: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(conn: F::Connection, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// Take the connection out of circulation for good.
    ///
    /// The pool forgets about it, freeing a slot for a new connection.
    pub fn detach(mut self) -> F::Connection {
        let conn = self.conn.take().expect("Connection already taken");
        self.pool.forget_one();
        conn
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("Connection already taken")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("Connection already taken")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl<F> fmt::Debug for PooledConnection<F>
where
    F: ConnectionFactory,
    F::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish()
    }
}

/// Dynamically growing pool of connections.
///
/// Connections are created lazily by a background top-up that every
/// [`acquire`](Pool::acquire) call triggers. The pool keeps at most a small
/// warm buffer of ready connections and never lets more than `max_size`
/// connections circulate.
///
/// Cloning a `Pool` yields another handle to the same connections.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{Connection, Pool, PoolConfig};
///
/// #[derive(Debug)]
/// struct Session {
///     queries: usize,
/// }
///
/// impl Connection for Session {
///     fn is_unusable(&self) -> bool {
///         false
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(|| Ok::<_, String>(Session { queries: 0 }), PoolConfig::default()).unwrap();
///
/// {
///     let mut session = pool.acquire().await.unwrap();
///     session.queries += 1;
///     // Handed back to the pool when `session` goes out of scope
/// }
///
/// assert!(pool.circulation_count() <= pool.max_size());
/// # }
/// ```
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("max_size", &self.inner.config.max_size)
            .field("in_circulation", &self.circulation_count())
            .field("available", &self.available_count())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool and start warming up its first connection.
    ///
    /// Must be called from within a tokio runtime; the pool spawns its
    /// background top-ups onto that runtime for the rest of its life.
    pub fn new(factory: F, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let inner = Arc::new(PoolInner {
            factory,
            ready: ArrayQueue::new(config.max_size),
            ready_permits: Semaphore::new(0),
            size: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
            metrics: MetricsTracker::new(),
            last_factory_error: Mutex::new(None),
            runtime,
            config,
        });

        debug!(
            max_size = inner.config.max_size,
            acquire_timeout = ?inner.config.acquire_timeout,
            retry_interval = ?inner.config.retry_interval,
            "Connection pool created"
        );
        inner.spawn_top_up();

        Ok(Self { inner })
    }

    /// Wait for a connection, giving up after the configured acquire timeout.
    ///
    /// Factory failures are never reported here; they only delay the
    /// arrival of a connection, so the single failure mode is
    /// [`PoolError::Timeout`].
    pub async fn acquire(&self) -> PoolResult<PooledConnection<F>> {
        self.inner.acquire().await
    }

    /// Hand a connection back to the pool it was acquired from.
    ///
    /// Equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection<F>) {
        drop(conn);
    }

    /// Connections currently in circulation, ready or lent out
    pub fn circulation_count(&self) -> usize {
        self.inner.size.load(Ordering::SeqCst)
    }

    /// Connections ready and not yet promised to a waiting caller
    pub fn available_count(&self) -> usize {
        self.inner.ready_permits.available_permits()
    }

    /// Callers currently blocked in [`acquire`](Pool::acquire)
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.load(Ordering::SeqCst)
    }

    /// Configured maximum circulation
    pub fn max_size(&self) -> usize {
        self.inner.config.max_size
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.available_count(),
            self.circulation_count(),
            self.waiter_count(),
            self.max_size(),
            self.inner.last_factory_error.lock().clone(),
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.metrics.get_metrics(
            self.circulation_count(),
            self.available_count(),
            self.waiter_count(),
            self.max_size(),
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    ready: ArrayQueue<F::Connection>,
    // One permit per connection in `ready` that no waiter has claimed yet.
    ready_permits: Semaphore,
    size: AtomicUsize,
    waiters: AtomicUsize,
    metrics: MetricsTracker,
    last_factory_error: Mutex<Option<String>>,
    runtime: Handle,
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn spawn_top_up(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move { inner.top_up().await });
    }

    /// Create at most one connection, retrying only while somebody waits.
    async fn top_up(&self) {
        // More than one connection left over after every registered waiter
        // takes one is warm enough.
        let unclaimed = self.ready_permits.available_permits();
        if unclaimed > self.waiters.load(Ordering::SeqCst) + 1 {
            trace!(unclaimed, "Ready buffer is warm, skipping top-up");
            return;
        }
        if !self.reserve_slot() {
            trace!(max_size = self.config.max_size, "Pool at capacity, skipping top-up");
            return;
        }

        loop {
            match self.factory.connect().await {
                Ok(conn) => {
                    MetricsTracker::record(&self.metrics.connections_created);
                    *self.last_factory_error.lock() = None;
                    debug!(
                        in_circulation = self.size.load(Ordering::SeqCst),
                        "Opened new connection"
                    );
                    self.push_ready(conn);
                    return;
                }
                Err(err) => {
                    MetricsTracker::record(&self.metrics.factory_failures);
                    *self.last_factory_error.lock() = Some(err.to_string());

                    let waiters = self.waiters.load(Ordering::SeqCst);
                    if waiters == 0 {
                        self.size.fetch_sub(1, Ordering::SeqCst);
                        MetricsTracker::record(&self.metrics.abandoned_top_ups);
                        debug!(error = %err, "Factory failed with nobody waiting, abandoning top-up");
                        return;
                    }

                    warn!(
                        error = %err,
                        waiters,
                        retry_interval = ?self.config.retry_interval,
                        "Factory failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Claim one circulation slot unless the pool is at capacity.
    fn reserve_slot(&self) -> bool {
        let max_size = self.config.max_size;
        self.size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |size| {
                (size < max_size).then_some(size + 1)
            })
            .is_ok()
    }

    async fn acquire(self: &Arc<Self>) -> PoolResult<PooledConnection<F>> {
        let timeout = self.config.acquire_timeout;
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);

        // Registered before the top-up starts so a failing factory sees us.
        let _waiter = WaiterGuard::register(&self.waiters);
        self.spawn_top_up();

        loop {
            match tokio::time::timeout_at(deadline, self.ready_permits.acquire()).await {
                Ok(Ok(permit)) => permit.forget(),
                // The semaphore is never closed; only the deadline ends the wait.
                Ok(Err(_)) | Err(_) => {
                    MetricsTracker::record(&self.metrics.acquire_timeouts);
                    debug!(?timeout, "Timed out waiting for a connection");
                    return Err(PoolError::Timeout(timeout));
                }
            }

            if let Some(conn) = self.ready.pop() {
                MetricsTracker::record(&self.metrics.total_acquired);
                return Ok(PooledConnection::new(conn, Arc::clone(self)));
            }
        }
    }

    fn release(&self, conn: F::Connection) {
        if conn.is_unusable() {
            let remaining = self.size.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            MetricsTracker::record(&self.metrics.connections_evicted);
            debug!(in_circulation = remaining, "Evicted unusable connection");
            return;
        }

        MetricsTracker::record(&self.metrics.total_released);
        self.push_ready(conn);
    }

    fn forget_one(&self) {
        let remaining = self.size.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        MetricsTracker::record(&self.metrics.connections_detached);
        debug!(in_circulation = remaining, "Connection detached from pool");
    }

    fn push_ready(&self, conn: F::Connection) {
        match self.ready.push(conn) {
            Ok(()) => self.ready_permits.add_permits(1),
            Err(conn) => {
                // Only reachable if circulation outgrew the queue capacity.
                warn!(max_size = self.config.max_size, "Ready queue full, dropping connection");
                self.size.fetch_sub(1, Ordering::SeqCst);
                drop(conn);
            }
        }
    }
}

/// Keeps the waiter count raised for as long as an `acquire` call is pending.
struct WaiterGuard<'a> {
    waiters: &'a AtomicUsize,
}

impl<'a> WaiterGuard<'a> {
    fn register(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self { waiters }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}
