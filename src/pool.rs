//! Connection pool.
//!
//! A bounded set of connections handed out LIFO. `acquire` validates idle
//! connections with a ping once the ping interval has elapsed; release rolls
//! back any open transaction before the connection rejoins the free list.

use crate::connection::{ConnectParams, Connection};
use crate::error::{Error, Result};
use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// What `acquire` does when every connection is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetMode {
    /// Block until a connection is available.
    #[default]
    Wait,
    /// Fail immediately with `PoolExhausted`.
    NoWait,
    /// Create a connection beyond `max`; it is closed on release rather
    /// than pooled.
    ForceGet,
    /// Block up to the given duration, then fail with `PoolExhausted`.
    TimedWait(Duration),
}

/// Callback run on a connection when it is first handed out after creation
/// or re-tagging.
pub type SessionCallback = Arc<
    dyn Fn(Connection) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

/// Pool sizing and behavior.
#[derive(Clone)]
pub struct PoolParams {
    /// Connections kept ready.
    pub min: u32,
    /// Upper bound on pooled connections.
    pub max: u32,
    /// Connections created per growth step.
    pub increment: u32,
    pub getmode: GetMode,
    /// Idle validation interval; `None` disables ping-on-acquire.
    pub ping_interval: Option<Duration>,
    /// Idle connections above `min` are pruned after this long.
    pub idle_timeout: Option<Duration>,
    /// Session state callback.
    pub session_callback: Option<SessionCallback>,
    /// All sessions share one credential set.
    pub homogeneous: bool,
    /// Statement cache size for pooled connections.
    pub stmt_cache_size: usize,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            min: 1,
            max: 4,
            increment: 1,
            getmode: GetMode::Wait,
            ping_interval: Some(Duration::from_secs(60)),
            idle_timeout: None,
            session_callback: None,
            homogeneous: true,
            stmt_cache_size: crate::protocol::constants::DEFAULT_STMT_CACHE_SIZE,
        }
    }
}

impl std::fmt::Debug for PoolParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolParams")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("increment", &self.increment)
            .field("getmode", &self.getmode)
            .finish_non_exhaustive()
    }
}

struct IdleEntry {
    conn: Connection,
    last_used: Instant,
    needs_session_callback: bool,
}

#[derive(Default)]
struct PoolState {
    free: Vec<IdleEntry>,
    busy: usize,
    creating: usize,
}

pub(crate) struct PoolInner {
    connect_params: ConnectParams,
    params: PoolParams,
    state: Mutex<PoolState>,
    released: Notify,
    closed: AtomicBool,
}

/// A bounded pool of connections.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool and open `min` connections eagerly.
    pub async fn create(connect_params: ConnectParams, params: PoolParams) -> Result<Self> {
        if params.max == 0 || params.min > params.max {
            return Err(Error::interface("pool bounds require 0 < min <= max"));
        }
        if !params.homogeneous {
            return Err(Error::NotSupported {
                feature: "heterogeneous pools",
            });
        }
        let mut connect_params = connect_params;
        connect_params.stmt_cache_size = params.stmt_cache_size;

        let pool = Self {
            inner: Arc::new(PoolInner {
                connect_params,
                params,
                state: Mutex::new(PoolState::default()),
                released: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        };

        for _ in 0..pool.inner.params.min {
            let conn = pool.open_connection().await?;
            let mut state = pool.inner.state.lock().await;
            state.free.push(IdleEntry {
                conn,
                last_used: Instant::now(),
                needs_session_callback: true,
            });
        }
        Ok(pool)
    }

    async fn open_connection(&self) -> Result<Connection> {
        Connection::connect_with_params(self.inner.connect_params.clone()).await
    }

    /// Number of idle connections.
    pub async fn open_count(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.free.len() + state.busy + state.creating
    }

    /// Number of connections currently handed out.
    pub async fn busy_count(&self) -> usize {
        self.inner.state.lock().await.busy
    }

    /// Acquire a connection according to the pool's get mode.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let deadline = match self.inner.params.getmode {
            GetMode::TimedWait(limit) => Some(Instant::now() + limit),
            _ => None,
        };

        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(Error::PoolClosed);
            }

            enum Plan {
                Reuse(IdleEntry),
                Create { force: bool },
                Wait,
            }

            let plan = {
                let mut state = self.inner.state.lock().await;
                if let Some(entry) = state.free.pop() {
                    state.busy += 1;
                    Plan::Reuse(entry)
                } else if (state.busy + state.creating) < self.inner.params.max as usize {
                    state.creating += 1;
                    Plan::Create { force: false }
                } else {
                    match self.inner.params.getmode {
                        GetMode::NoWait => return Err(Error::PoolExhausted),
                        GetMode::ForceGet => Plan::Create { force: true },
                        GetMode::Wait | GetMode::TimedWait(_) => Plan::Wait,
                    }
                }
            };

            match plan {
                Plan::Reuse(entry) => {
                    match self.validate(entry).await {
                        Ok(conn) => return Ok(self.guard(conn, false)),
                        Err(e) => {
                            debug!("discarding dead pooled connection: {}", e);
                            let mut state = self.inner.state.lock().await;
                            state.busy -= 1;
                            drop(state);
                            self.inner.released.notify_one();
                            continue;
                        }
                    }
                }
                Plan::Create { force } => {
                    let result = self.open_connection().await;
                    let mut state = self.inner.state.lock().await;
                    if !force {
                        state.creating -= 1;
                    }
                    match result {
                        Ok(conn) => {
                            if !force {
                                state.busy += 1;
                            }
                            drop(state);
                            if !force {
                                self.grow_by_increment().await;
                            }
                            self.run_session_callback(&conn).await?;
                            return Ok(self.guard(conn, force));
                        }
                        Err(e) => {
                            drop(state);
                            self.inner.released.notify_one();
                            return Err(e);
                        }
                    }
                }
                Plan::Wait => {
                    let notified = self.inner.released.notified();
                    match deadline {
                        Some(deadline) => {
                            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                                return Err(Error::PoolExhausted);
                            }
                        }
                        None => notified.await,
                    }
                }
            }
        }
    }

    /// Grow by the configured increment beyond the connection just created,
    /// parking the extras on the free list.
    async fn grow_by_increment(&self) {
        for _ in 1..self.inner.params.increment {
            {
                let mut state = self.inner.state.lock().await;
                if state.free.len() + state.busy + state.creating
                    >= self.inner.params.max as usize
                {
                    return;
                }
                state.creating += 1;
            }
            let result = self.open_connection().await;
            let mut state = self.inner.state.lock().await;
            state.creating -= 1;
            match result {
                Ok(conn) => {
                    state.free.push(IdleEntry {
                        conn,
                        last_used: Instant::now(),
                        needs_session_callback: true,
                    });
                    drop(state);
                    self.inner.released.notify_one();
                }
                Err(e) => {
                    drop(state);
                    debug!("pool growth stopped: {}", e);
                    return;
                }
            }
        }
    }

    /// Validate a pooled connection before handing it out: roll back any
    /// transaction left open by the releaser, and ping when the interval
    /// has elapsed.
    async fn validate(&self, entry: IdleEntry) -> Result<Connection> {
        let conn = entry.conn;
        if !conn.is_open() {
            return Err(Error::ConnectionClosed);
        }
        if conn.transaction_in_progress().await {
            conn.rollback().await?;
        }
        if let Some(interval) = self.inner.params.ping_interval {
            if entry.last_used.elapsed() >= interval {
                conn.ping().await?;
            }
        }
        if entry.needs_session_callback {
            self.run_session_callback(&conn).await?;
        }
        Ok(conn)
    }

    async fn run_session_callback(&self, conn: &Connection) -> Result<()> {
        if let Some(callback) = &self.inner.params.session_callback {
            callback(conn.clone()).await?;
        }
        Ok(())
    }

    fn guard(&self, conn: Connection, force: bool) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::downgrade(&self.inner),
            force,
        }
    }

    /// Prune idle connections above `min` that have outlived the idle
    /// timeout.
    pub async fn prune_idle(&self) {
        let Some(idle_timeout) = self.inner.params.idle_timeout else {
            return;
        };
        let min = self.inner.params.min as usize;
        let mut pruned = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            while state.free.len() > min {
                match state.free.first() {
                    Some(entry) if entry.last_used.elapsed() >= idle_timeout => {
                        pruned.push(state.free.remove(0));
                    }
                    _ => break,
                }
            }
        }
        for entry in pruned {
            let _ = entry.conn.close().await;
        }
    }

    /// Close the pool and every idle connection. Busy connections close as
    /// they are released.
    pub async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        let entries = {
            let mut state = self.inner.state.lock().await;
            std::mem::take(&mut state.free)
        };
        for entry in entries {
            if let Err(e) = entry.conn.close().await {
                warn!("error closing pooled connection: {}", e);
            }
        }
        self.inner.released.notify_waiters();
        Ok(())
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("max", &self.inner.params.max)
            .finish_non_exhaustive()
    }
}

/// A connection checked out of a pool. Dropping it returns the connection;
/// `release` does the same with the rollback done eagerly.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Weak<PoolInner>,
    /// Created by FORCEGET beyond `max`: closed on release, never pooled.
    force: bool,
}

impl PooledConnection {
    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection already released")
    }

    /// Release back to the pool, rolling back any open transaction and
    /// releasing the DRCP session when tagged.
    pub async fn release(mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let Some(pool) = self.pool.upgrade() else {
            return conn.close().await;
        };

        if self.force || pool.closed.load(Ordering::Acquire) || !conn.is_open() {
            if !self.force {
                let mut state = pool.state.lock().await;
                state.busy = state.busy.saturating_sub(1);
            }
            pool.released.notify_one();
            return conn.close().await;
        }

        if conn.transaction_in_progress().await {
            conn.rollback().await?;
        }
        if pool.connect_params.tag.is_some() {
            let _ = conn.release_drcp_session(false).await;
        }

        let mut state = pool.state.lock().await;
        state.busy = state.busy.saturating_sub(1);
        state.free.push(IdleEntry {
            conn,
            last_used: Instant::now(),
            needs_session_callback: false,
        });
        drop(state);
        pool.released.notify_one();
        Ok(())
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        if self.force {
            // Out-of-band connection: nothing to return.
            return;
        }
        // Synchronous return path: the rollback is deferred to the next
        // acquire's validation step.
        if let Ok(mut state) = pool.state.try_lock() {
            state.busy = state.busy.saturating_sub(1);
            if conn.is_open() && !pool.closed.load(Ordering::Acquire) {
                state.free.push(IdleEntry {
                    conn,
                    last_used: Instant::now(),
                    needs_session_callback: false,
                });
            }
            drop(state);
            pool.released.notify_one();
        } else {
            // Contended: hand the return off to the runtime.
            let pool = pool.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let mut state = pool.state.lock().await;
                    state.busy = state.busy.saturating_sub(1);
                    if conn.is_open() && !pool.closed.load(Ordering::Acquire) {
                        state.free.push(IdleEntry {
                            conn,
                            last_used: Instant::now(),
                            needs_session_callback: false,
                        });
                    }
                    drop(state);
                    pool.released.notify_one();
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_params_validation() {
        let params = PoolParams {
            min: 5,
            max: 2,
            ..Default::default()
        };
        let connect = ConnectParams::new("localhost/X", "u", "p");
        let result = tokio_test::block_on(Pool::create(connect, params));
        assert!(matches!(result, Err(Error::Interface { .. })));
    }

    #[test]
    fn test_getmode_default() {
        assert_eq!(GetMode::default(), GetMode::Wait);
    }
}
