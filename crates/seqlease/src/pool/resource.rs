use crate::{ConnectionManager, Error, MonotonicClock, PoolConfig, Result, TimeSource};
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::VecDeque;

struct IdleConn<C> {
    conn: C,
    returned_at: u64,
}

struct PoolState<C> {
    // Front is least recently returned, back most recently.
    idle: VecDeque<IdleConn<C>>,
    // Idle plus checked out.
    active: usize,
    closed: bool,
}

enum Candidate<C> {
    Idle(IdleConn<C>),
    Open,
}

/// A bounded pool of reusable connections.
///
/// Connections move through `created -> idle -> checked out -> (idle |
/// destroyed)`. [`get`](Self::get) prefers the most recently returned idle
/// connection and opens a new one only when none is usable;
/// [`put`](Self::put) returns a connection for reuse or closes it.
///
/// The pool never blocks waiting for a connection: once `max_active`
/// connections are alive, `get` fails with [`Error::PoolExhausted`] so the
/// caller can apply its own backoff.
///
/// A single mutex guards the idle list and the active count. It is only held
/// for O(1) bookkeeping, never while the [`ConnectionManager`] opens, closes
/// or checks a connection.
pub struct Pool<M: ConnectionManager, T = MonotonicClock> {
    manager: M,
    config: PoolConfig,
    clock: T,
    state: Mutex<PoolState<M::Connection>>,
}

impl<M: ConnectionManager> Pool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        Self::with_clock(manager, config, MonotonicClock::new())
    }
}

impl<M, T> Pool<M, T>
where
    M: ConnectionManager,
    T: TimeSource,
{
    pub fn with_clock(manager: M, config: PoolConfig, clock: T) -> Self {
        Self {
            manager,
            config,
            clock,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
        }
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub const fn manager(&self) -> &M {
        &self.manager
    }

    /// Checks a connection out of the pool.
    ///
    /// Idle connections past the idle timeout are closed first, oldest
    /// first. Then idle connections are tried most recently returned first,
    /// each vetted by [`ConnectionManager::check`]. If none is usable and the
    /// active count allows it, a new connection is opened.
    ///
    /// Failures to close evicted or rejected connections are logged and
    /// otherwise ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] after [`release`](Self::release).
    /// - [`Error::PoolExhausted`] when `max_active` connections are alive.
    /// - [`Error::Connect`] if opening a connection fails; its reserved slot
    ///   is released again.
    pub fn get(&self) -> Result<M::Connection> {
        let stale = self.take_stale()?;
        for conn in stale {
            self.close_quietly(conn);
        }

        loop {
            let candidate = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                match state.idle.pop_back() {
                    Some(idle) => Candidate::Idle(idle),
                    None if self.has_room(state.active) => {
                        state.active += 1;
                        Candidate::Open
                    }
                    None => {
                        return Err(Error::PoolExhausted {
                            max_active: self.config.max_active,
                        });
                    }
                }
            };

            match candidate {
                Candidate::Idle(idle) => {
                    let idle_for = self.idle_for(idle.returned_at);
                    match self.manager.check(&idle.conn, idle_for) {
                        Ok(()) => return Ok(idle.conn),
                        Err(_e) => {
                            #[cfg(feature = "tracing")]
                            {
                                let _e: crate::BoxError = _e.into();
                                tracing::debug!("Discarding idle connection: {}", _e);
                            }

                            self.state.lock().active -= 1;
                            self.close_quietly(idle.conn);
                        }
                    }
                }
                Candidate::Open => {
                    return self.manager.connect().map_err(|e| {
                        self.state.lock().active -= 1;
                        Error::Connect(e.into())
                    });
                }
            }
        }
    }

    /// Returns a checked-out connection.
    ///
    /// With `force_close` unset on an open pool, the connection becomes the
    /// most recently used idle entry; if that pushes the idle list past
    /// `max_idle`, the least recently used entry is closed instead.
    /// Otherwise the connection itself is closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnect`] if closing a connection fails. Its slot
    /// is freed regardless.
    pub fn put(&self, conn: M::Connection, force_close: bool) -> Result<()> {
        let doomed = {
            let mut state = self.state.lock();
            if force_close || state.closed {
                state.active = state.active.saturating_sub(1);
                Some(conn)
            } else {
                state.idle.push_back(IdleConn {
                    conn,
                    returned_at: self.clock.current_millis(),
                });
                if self.config.max_idle != 0 && state.idle.len() > self.config.max_idle {
                    state.active = state.active.saturating_sub(1);
                    state.idle.pop_front().map(|idle| idle.conn)
                } else {
                    None
                }
            }
        };

        match doomed {
            Some(conn) => self.close(conn),
            None => Ok(()),
        }
    }

    /// Number of live connections, idle and checked out.
    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Closes the pool and every idle connection.
    ///
    /// Subsequent [`get`](Self::get) calls fail. Connections still checked
    /// out should be handed back with `put(conn, true)`. Calling `release`
    /// again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Disconnect`] encountered; every idle
    /// connection is closed regardless.
    pub fn release(&self) -> Result<()> {
        let idle = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).map(|idle| idle.conn).collect();
            state.active = state.active.saturating_sub(idle.len());
            idle
        };

        #[cfg(feature = "tracing")]
        tracing::debug!("Releasing pool with {} idle connections", idle.len());

        let mut first_err = None;
        for conn in idle {
            if let Err(e) = self.close(conn) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    const fn has_room(&self, active: usize) -> bool {
        self.config.max_active == 0 || active < self.config.max_active
    }

    fn idle_for(&self, returned_at: u64) -> Duration {
        Duration::from_millis(self.clock.current_millis().saturating_sub(returned_at))
    }

    // Removes idle connections past the timeout, oldest first. Their slots
    // are freed here; closing happens after the lock is dropped.
    fn take_stale(&self) -> Result<Vec<M::Connection>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::PoolClosed);
        }
        if self.config.idle_timeout.is_zero() {
            return Ok(Vec::new());
        }

        let timeout = u64::try_from(self.config.idle_timeout.as_millis()).unwrap_or(u64::MAX);
        let now = self.clock.current_millis();
        let mut stale = Vec::new();
        while let Some(oldest) = state.idle.front() {
            if now.saturating_sub(oldest.returned_at) <= timeout {
                break;
            }
            if let Some(idle) = state.idle.pop_front() {
                state.active = state.active.saturating_sub(1);
                stale.push(idle.conn);
            }
        }
        Ok(stale)
    }

    fn close(&self, conn: M::Connection) -> Result<()> {
        self.manager
            .disconnect(conn)
            .map_err(|e| Error::Disconnect(e.into()))
    }

    fn close_quietly(&self, conn: M::Connection) {
        if let Err(_e) = self.close(conn) {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to close pooled connection: {}", _e);
        }
    }
}

impl<M: ConnectionManager, T> Drop for Pool<M, T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.closed = true;
        for idle in state.idle.drain(..) {
            let _ = self.manager.disconnect(idle.conn);
        }
    }
}
