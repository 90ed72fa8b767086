use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use esox_connectionpool::{Connection, ConnectionFactory, Pool, PoolConfig, PoolError};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};

#[derive(Debug)]
struct DummyConnection {
    id: usize,
}

impl Connection for DummyConnection {
    fn is_unusable(&self) -> bool {
        self.id >= 1000
    }
}

/// Factory whose health is toggled per test.
struct SwitchableFactory {
    healthy: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    next_id: AtomicUsize,
}

impl SwitchableFactory {
    fn new(healthy: bool) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(healthy)),
            calls: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConnectionFactory for SwitchableFactory {
    type Connection = DummyConnection;
    type Error = String;

    async fn connect(&self) -> Result<DummyConnection, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err("server unavailable".to_string());
        }
        Ok(DummyConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }
}

fn config(max_size: usize, acquire_timeout: Duration, retry_interval: Duration) -> PoolConfig {
    PoolConfig::new()
        .with_max_size(max_size)
        .with_acquire_timeout(acquire_timeout)
        .with_retry_interval(retry_interval)
}

#[tokio::test]
async fn released_connection_is_reused() {
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(10, Duration::from_secs(1), Duration::from_secs(1)),
    )
    .unwrap();

    {
        let mut conn = pool.acquire().await.unwrap();
        conn.id = 500;
    }

    let mut held = Vec::new();
    let found = loop {
        let conn = pool.acquire().await.unwrap();
        if conn.id == 500 {
            break true;
        }
        held.push(conn);
        if held.len() >= 10 {
            break false;
        }
    };
    assert!(found, "modified connection was never handed out again");
}

#[tokio::test]
async fn sequential_use_keeps_circulation_small() {
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(10, Duration::from_millis(10), Duration::from_secs(1)),
    )
    .unwrap();

    for _ in 0..10 {
        let conn = pool.acquire().await.unwrap();
        // One in use plus the warm buffer being prepared behind it.
        let count = pool.circulation_count();
        assert!(count <= 3, "the pool created too many connections: {}", count);
        pool.release(conn);
    }
}

#[tokio::test]
async fn exhausted_pool_times_out() {
    let timeout = Duration::from_millis(50);
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(10, timeout, Duration::from_secs(1)),
    )
    .unwrap();

    let mut held = Vec::new();
    for _ in 0..10 {
        held.push(pool.acquire().await.expect("pool should grow to its maximum"));
    }
    assert_eq!(pool.circulation_count(), 10);

    let started = Instant::now();
    let err = pool.acquire().await.unwrap_err();
    assert_eq!(err, PoolError::Timeout(timeout));
    assert!(started.elapsed() >= timeout);
    assert_eq!(pool.circulation_count(), 10);
    assert_eq!(pool.get_metrics().acquire_timeouts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_up_to_capacity_succeed() {
    let timeout = Duration::from_millis(500);
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(10, timeout, Duration::from_millis(1)),
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let pool = pool.clone();
        tasks.spawn(async move { pool.acquire().await });
    }

    let mut held = Vec::new();
    while let Some(result) = tasks.join_next().await {
        held.push(result.unwrap().expect("acquire within capacity should succeed"));
    }
    assert_eq!(held.len(), 10);
    assert!(pool.circulation_count() <= 10);

    let started = Instant::now();
    let err = pool.acquire().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() >= timeout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn circulation_never_exceeds_capacity() {
    let max_size = 4;
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(max_size, Duration::from_secs(2), Duration::from_millis(1)),
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let pool = pool.clone();
        tasks.spawn(async move {
            let mut peak = 0;
            for _ in 0..20 {
                if let Ok(conn) = pool.acquire().await {
                    peak = peak.max(pool.circulation_count());
                    tokio::task::yield_now().await;
                    drop(conn);
                }
                peak = peak.max(pool.circulation_count());
            }
            peak
        });
    }

    while let Some(peak) = tasks.join_next().await {
        assert!(peak.unwrap() <= max_size);
    }
    assert!(pool.circulation_count() <= max_size);
    assert_eq!(pool.waiter_count(), 0);
}

#[tokio::test]
async fn unusable_connection_is_evicted() {
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(10, Duration::from_millis(10), Duration::from_secs(1)),
    )
    .unwrap();

    {
        let mut conn = pool.acquire().await.unwrap();
        conn.id = 1000;
    }

    let mut held = Vec::new();
    loop {
        match pool.acquire().await {
            Ok(conn) => {
                assert!(!conn.is_unusable(), "received unusable connection");
                held.push(conn);
            }
            // We got all connections, no unusable one among them.
            Err(_) => break,
        }
    }
    assert_eq!(pool.get_metrics().connections_evicted, 1);
}

#[tokio::test]
async fn eviction_decreases_circulation_by_one() {
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(1, Duration::from_millis(100), Duration::from_secs(1)),
    )
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let evicted_id = conn.id;
    assert_eq!(pool.circulation_count(), 1);

    conn.id = 1000;
    pool.release(conn);
    assert_eq!(pool.circulation_count(), 0);
    assert_eq!(pool.available_count(), 0);

    let fresh = pool.acquire().await.unwrap();
    assert_ne!(fresh.id, evicted_id);
    assert!(!fresh.is_unusable());
}

#[tokio::test(start_paused = true)]
async fn recovers_once_factory_succeeds() {
    let factory = SwitchableFactory::new(false);
    let healthy = Arc::clone(&factory.healthy);
    let pool = Pool::new(
        factory,
        config(10, Duration::from_millis(10), Duration::from_millis(1)),
    )
    .unwrap();

    let err = pool.acquire().await.unwrap_err();
    assert!(err.is_timeout(), "pool did not return error while every connect fails");
    assert!(!pool.get_health_status().is_healthy());

    tokio::spawn(async move {
        sleep(Duration::from_millis(5)).await;
        healthy.store(true, Ordering::SeqCst);
    });

    pool.acquire()
        .await
        .expect("pool did not recover after the factory came back");
    assert!(pool.get_health_status().last_factory_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded_by_failures_times_interval() {
    struct FailFirst {
        remaining_failures: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionFactory for FailFirst {
        type Connection = DummyConnection;
        type Error = &'static str;

        async fn connect(&self) -> Result<DummyConnection, &'static str> {
            let fail = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                Err("refused")
            } else {
                Ok(DummyConnection { id: 1 })
            }
        }
    }

    let failures = 3;
    let retry_interval = Duration::from_millis(10);
    let factory = FailFirst {
        remaining_failures: AtomicUsize::new(failures),
    };
    let pool = Pool::new(factory, config(2, Duration::from_secs(1), retry_interval)).unwrap();

    let started = Instant::now();
    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id, 1);
    assert!(started.elapsed() <= retry_interval * (failures as u32 + 1));
    assert_eq!(pool.get_metrics().factory_failures, failures);
}

#[tokio::test(start_paused = true)]
async fn failing_factory_stops_without_waiters() {
    let factory = SwitchableFactory::new(false);
    let calls = Arc::clone(&factory.calls);
    let pool = Pool::new(
        factory,
        config(10, Duration::from_millis(10), Duration::from_millis(1)),
    )
    .unwrap();

    assert!(pool.acquire().await.is_err());
    assert_eq!(pool.waiter_count(), 0);

    // Let in-flight retries notice that nobody is waiting any more.
    sleep(Duration::from_millis(5)).await;
    let settled = calls.load(Ordering::SeqCst);
    assert!(settled > 1, "factory should have been retried while waiting");

    sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), settled);
    assert_eq!(pool.circulation_count(), 0);
    assert!(pool.get_metrics().abandoned_top_ups >= 1);
}

#[tokio::test(start_paused = true)]
async fn end_to_end_scenario() {
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(10, Duration::from_millis(10), Duration::from_millis(1)),
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let pool = pool.clone();
        tasks.spawn(async move { pool.acquire().await });
    }

    let mut held = Vec::new();
    while let Some(result) = tasks.join_next().await {
        held.push(result.unwrap().unwrap());
    }
    assert!(pool.circulation_count() <= 10);

    let started = Instant::now();
    assert!(pool.acquire().await.is_err());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(10));
    assert!(elapsed < Duration::from_millis(15));
}

#[cfg(feature = "metrics")]
#[tokio::test]
async fn prometheus_export_reflects_pool_state() {
    let pool = Pool::new(
        SwitchableFactory::new(true),
        config(5, Duration::from_millis(100), Duration::from_millis(1)),
    )
    .unwrap();

    let _conn = pool.acquire().await.unwrap();
    let output = pool.export_metrics_prometheus("primary", None).unwrap();
    assert!(output.contains("connpool_acquired_total{pool=\"primary\"} 1"));
    assert!(output.contains("connpool_max_size{pool=\"primary\"} 5"));
}
