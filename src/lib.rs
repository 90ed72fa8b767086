//! # EsoxSolutions.ConnectionPool
//!
//! Dynamically growing, async pool of expensive-to-create connections.
//!
//! ## Features
//!
//! - Lazy, just-in-time connection creation under a hard capacity cap
//! - Small pre-warmed buffer: the pool starts preparing the next connection
//!   while one is still available
//! - Bounded-time acquisition with a single timeout error
//! - Automatic return of connections via RAII (Drop trait)
//! - Eviction of connections that report themselves unusable on release
//! - Factory retries at a fixed interval, only while callers are waiting
//! - Health reporting and metrics, with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connectionpool::{Connection, Pool, PoolConfig};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct Session {
//!     healthy: bool,
//! }
//!
//! impl Connection for Session {
//!     fn is_unusable(&self) -> bool {
//!         !self.healthy
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = PoolConfig::new()
//!     .with_max_size(4)
//!     .with_acquire_timeout(Duration::from_millis(500));
//!
//! let pool = Pool::new(|| Ok::<_, String>(Session { healthy: true }), config).unwrap();
//! {
//!     let session = pool.acquire().await.unwrap();
//!     assert!(session.healthy);
//!     // Session automatically returned when it goes out of scope
//! }
//! assert!(pool.circulation_count() <= 4);
//! # }
//! ```

mod config;
mod connection;
mod errors;
mod health;
mod metrics;
mod pool;

pub use config::PoolConfig;
pub use connection::{Connection, ConnectionFactory};
pub use errors::{PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{Pool, PooledConnection};
