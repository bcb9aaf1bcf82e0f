use crate::BoxError;
use core::{fmt, time::Duration};

/// Opens, closes and validates the connections held by a
/// [`Pool`](crate::Pool).
///
/// The pool never calls these methods while holding its own lock, so they
/// may block on I/O.
pub trait ConnectionManager: Send + Sync {
    type Connection: Send;
    type Error: Into<BoxError>;

    /// Opens a new connection.
    fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Closes a connection the pool is discarding.
    fn disconnect(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    /// Vets an idle connection before it is handed out again. `idle_for` is
    /// how long it sat in the pool. Rejected connections are closed and the
    /// next candidate is tried.
    fn check(&self, conn: &Self::Connection, idle_for: Duration) -> Result<(), Self::Error> {
        let _ = (conn, idle_for);
        Ok(())
    }
}

type ConnectFn<C> = Box<dyn Fn() -> Result<C, BoxError> + Send + Sync>;
type DisconnectFn<C> = Box<dyn Fn(C) -> Result<(), BoxError> + Send + Sync>;
type CheckFn<C> = Box<dyn Fn(&C, Duration) -> Result<(), BoxError> + Send + Sync>;

/// A [`ConnectionManager`] built from a constructor, a destructor and an
/// optional health check.
///
/// # Example
/// ```
/// use seqlease::{FnManager, Pool, PoolConfig};
///
/// let manager = FnManager::new(|| Ok(String::from("conn")), |_conn| Ok(()))
///     .with_check(|conn: &String, _idle_for| {
///         if conn.is_empty() { Err("empty".into()) } else { Ok(()) }
///     });
/// let pool = Pool::new(manager, PoolConfig::default());
///
/// let conn = pool.get().unwrap();
/// pool.put(conn, false).unwrap();
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct FnManager<C> {
    connect: ConnectFn<C>,
    disconnect: DisconnectFn<C>,
    check: Option<CheckFn<C>>,
}

impl<C> FnManager<C> {
    pub fn new(
        connect: impl Fn() -> Result<C, BoxError> + Send + Sync + 'static,
        disconnect: impl Fn(C) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            connect: Box::new(connect),
            disconnect: Box::new(disconnect),
            check: None,
        }
    }

    #[must_use]
    pub fn with_check(
        mut self,
        check: impl Fn(&C, Duration) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.check = Some(Box::new(check));
        self
    }
}

impl<C> fmt::Debug for FnManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnManager")
            .field("check", &self.check.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: Send> ConnectionManager for FnManager<C> {
    type Connection = C;
    type Error = BoxError;

    fn connect(&self) -> Result<C, BoxError> {
        (self.connect)()
    }

    fn disconnect(&self, conn: C) -> Result<(), BoxError> {
        (self.disconnect)(conn)
    }

    fn check(&self, conn: &C, idle_for: Duration) -> Result<(), BoxError> {
        self.check.as_ref().map_or(Ok(()), |check| check(conn, idle_for))
    }
}
