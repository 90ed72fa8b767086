//! Async usage examples

use async_trait::async_trait;
use esox_connectionpool::{Connection, ConnectionFactory, Pool, PoolConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Session {
    id: usize,
    failed: bool,
}

impl Connection for Session {
    fn is_unusable(&self) -> bool {
        self.failed
    }
}

/// Opens sessions with a bit of latency and refuses the first few attempts.
struct FlakyServer {
    attempts: AtomicUsize,
    refuse_first: usize,
}

#[async_trait]
impl ConnectionFactory for FlakyServer {
    type Connection = Session;
    type Error = String;

    async fn connect(&self) -> Result<Session, String> {
        sleep(Duration::from_millis(20)).await;
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refuse_first {
            return Err(format!("connection refused (attempt {})", attempt + 1));
        }
        Ok(Session {
            id: attempt,
            failed: false,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    println!("=== EsoxSolutions.ConnectionPool - Async Examples ===\n");

    // Example 1: Acquire and release
    acquire_release().await;

    // Example 2: Timeout when the pool is exhausted
    exhausted_timeout().await;

    // Example 3: Recovering from a failing server
    retry_while_waiting().await;

    // Example 4: Concurrent access
    concurrent_access().await;
}

async fn acquire_release() {
    println!("1. Acquire and Release:");
    let pool = Pool::new(|| Ok::<_, String>(Session { id: 0, failed: false }), PoolConfig::default()).unwrap();

    {
        let session = pool.acquire().await.unwrap();
        println!("   Got session {}", session.id);
    }

    println!("   In circulation: {}", pool.circulation_count());
    println!();
}

async fn exhausted_timeout() {
    println!("2. Exhausted Pool:");

    let config = PoolConfig::new()
        .with_max_size(1)
        .with_acquire_timeout(Duration::from_millis(100));

    let pool = Pool::new(|| Ok::<_, String>(Session { id: 42, failed: false }), config).unwrap();

    // Hold the only session
    let _session = pool.acquire().await.unwrap();

    // Try to get another (should timeout)
    match pool.acquire().await {
        Ok(_) => println!("   Got session"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}

async fn retry_while_waiting() {
    println!("3. Retry While Waiting:");

    let config = PoolConfig::new()
        .with_max_size(4)
        .with_acquire_timeout(Duration::from_secs(1))
        .with_retry_interval(Duration::from_millis(50));

    let server = FlakyServer {
        attempts: AtomicUsize::new(0),
        refuse_first: 3,
    };
    let pool = Pool::new(server, config).unwrap();

    match pool.acquire().await {
        Ok(session) => println!("   Got session {} after the server recovered", session.id),
        Err(e) => println!("   Error: {}", e),
    }

    let health = pool.get_health_status();
    println!("   Healthy: {} ({} warnings)", health.is_healthy(), health.warning_count);
    println!("   Factory failures: {}", pool.get_metrics().factory_failures);
    println!();
}

async fn concurrent_access() {
    println!("4. Concurrent Access:");

    let next_id = Arc::new(AtomicUsize::new(0));
    let config = PoolConfig::new()
        .with_max_size(3)
        .with_acquire_timeout(Duration::from_millis(500));
    let pool = Pool::new(
        move || {
            Ok::<_, String>(Session {
                id: next_id.fetch_add(1, Ordering::SeqCst),
                failed: false,
            })
        },
        config,
    )
    .unwrap();

    let mut handles = vec![];

    for i in 0..10 {
        let pool_clone = pool.clone();
        let handle = tokio::spawn(async move {
            match pool_clone.acquire().await {
                Ok(mut session) => {
                    println!("   Task {} got session {}", i, session.id);
                    sleep(Duration::from_millis(50)).await;
                    // Every fourth task breaks its session, which gets evicted on release
                    session.failed = i % 4 == 0;
                }
                Err(e) => println!("   Task {} couldn't get a session: {}", i, e),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    println!("   Final in circulation: {}", pool.circulation_count());

    #[cfg(feature = "metrics")]
    match pool.export_metrics_prometheus("demo", None) {
        Ok(output) => print!("{}", output),
        Err(e) => println!("   Metrics error: {}", e),
    }
}
