// EsoxSolutions.ConnectionPool
// Dynamically growing async connection pool

// This is just a binary wrapper - the actual library is in lib.rs
// Run the demo with: cargo run --example async_usage

use esox_connectionpool::{Connection, Pool, PoolConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct DemoConnection;

impl Connection for DemoConnection {
    fn is_unusable(&self) -> bool {
        false
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== EsoxSolutions.ConnectionPool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example async_usage");
    println!();

    println!("Quick Demo:");
    let config = PoolConfig::new()
        .with_max_size(3)
        .with_acquire_timeout(Duration::from_millis(200));

    let pool = match Pool::new(|| Ok::<_, String>(DemoConnection), config) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("  Failed to create pool: {}", e);
            return;
        }
    };

    match pool.acquire().await {
        Ok(_conn) => println!("  Got connection, {} in circulation", pool.circulation_count()),
        Err(e) => println!("  Error: {}", e),
    }

    println!("  Available after return: {}", pool.available_count());
}
