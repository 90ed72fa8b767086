//! Capabilities a pooled connection and its factory must provide

use std::fmt;

use async_trait::async_trait;

/// A resource that can be lent out by a [`Pool`](crate::Pool).
///
/// The pool asks [`is_unusable`](Connection::is_unusable) exactly once, when
/// the connection is released. Connections sitting in the ready queue are
/// never revalidated.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::Connection;
///
/// struct Session {
///     broken: bool,
/// }
///
/// impl Connection for Session {
///     fn is_unusable(&self) -> bool {
///         self.broken
///     }
/// }
/// ```
pub trait Connection: Send + 'static {
    /// Whether the connection must be taken out of circulation instead of
    /// being handed to the next caller. Dropping an evicted connection is the
    /// only disposal the pool performs.
    fn is_unusable(&self) -> bool;
}

/// Produces new connections on demand.
///
/// Any `Fn() -> Result<C, E>` closure is a factory; implement the trait
/// directly when opening a connection needs to await.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Type of connection this factory opens
    type Connection: Connection;

    /// Error reported when opening a connection fails
    type Error: fmt::Display + Send + 'static;

    /// Open a new connection
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;
}

#[async_trait]
impl<F, C, E> ConnectionFactory for F
where
    F: Fn() -> Result<C, E> + Send + Sync + 'static,
    C: Connection,
    E: fmt::Display + Send + 'static,
{
    type Connection = C;
    type Error = E;

    async fn connect(&self) -> Result<C, E> {
        (self)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(u32);

    impl Connection for Probe {
        fn is_unusable(&self) -> bool {
            self.0 == 0
        }
    }

    #[tokio::test]
    async fn test_closure_is_a_factory() {
        let factory = || Ok::<_, String>(Probe(7));
        let conn = factory.connect().await.unwrap();
        assert_eq!(conn.0, 7);
        assert!(!conn.is_unusable());
    }

    #[tokio::test]
    async fn test_closure_error_is_passed_through() {
        let factory = || Err::<Probe, _>("refused".to_string());
        let err = factory.connect().await.err().unwrap();
        assert_eq!(err, "refused");
    }
}
