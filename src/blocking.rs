//! Blocking presentation of the driver.
//!
//! The cooperative core is the single implementation; this module drives it
//! from a current-thread runtime so one OS thread serializes one
//! connection's calls, with semantics identical to the async surface.
//! Out-of-band breaks stay disabled; `cancel` uses the in-band marker path
//! and is safe to call from any thread.

use crate::cursor::ExecuteManyOptions;
use crate::error::{Error, Result};
use crate::pool::{PoolParams, PooledConnection};
use crate::protocol::types::{OracleType, OracleValue, Row, Variable};
use crate::{BatchError, Column, ConnectParams};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

fn new_runtime() -> Result<Arc<Runtime>> {
    let runtime = Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    Ok(Arc::new(runtime))
}

/// A blocking connection.
pub struct Connection {
    runtime: Arc<Runtime>,
    inner: crate::Connection,
}

impl Connection {
    /// Connect with an EZConnect string and password credentials.
    pub fn connect(connect_string: &str, username: &str, password: &str) -> Result<Self> {
        Self::connect_with_params(ConnectParams::new(connect_string, username, password))
    }

    /// Connect with full parameters.
    pub fn connect_with_params(params: ConnectParams) -> Result<Self> {
        let runtime = new_runtime()?;
        let inner = runtime.block_on(crate::Connection::connect_with_params(params))?;
        Ok(Self { runtime, inner })
    }

    /// The async connection backing this handle.
    pub fn as_async(&self) -> &crate::Connection {
        &self.inner
    }

    /// Open a blocking cursor.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            runtime: self.runtime.clone(),
            inner: self.inner.cursor(),
        }
    }

    pub fn host(&self) -> &str {
        self.inner.host()
    }

    pub fn protocol_version(&self) -> u16 {
        self.inner.protocol_version()
    }

    pub fn server_version(&self) -> Option<(u8, u8, u8, u8, u8)> {
        self.inner.server_version()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn autocommit(&self) -> bool {
        self.inner.autocommit()
    }

    pub fn set_autocommit(&self, autocommit: bool) {
        self.inner.set_autocommit(autocommit)
    }

    pub fn commit(&self) -> Result<()> {
        self.runtime.block_on(self.inner.commit())
    }

    pub fn rollback(&self) -> Result<()> {
        self.runtime.block_on(self.inner.rollback())
    }

    pub fn ping(&self) -> Result<()> {
        self.runtime.block_on(self.inner.ping())
    }

    /// Cancel the call in flight. Callable from any thread while another
    /// thread is blocked in a call on this connection.
    pub fn cancel(&self) {
        self.inner.cancel()
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

/// A blocking cursor.
pub struct Cursor {
    runtime: Arc<Runtime>,
    inner: crate::Cursor,
}

impl Cursor {
    pub fn execute(&mut self, sql: &str, params: &[OracleValue]) -> Result<u64> {
        self.runtime.block_on(self.inner.execute(sql, params))
    }

    pub fn execute_vars(&mut self, sql: &str, vars: Vec<Variable>) -> Result<u64> {
        self.runtime.block_on(self.inner.execute_vars(sql, vars))
    }

    pub fn executemany(
        &mut self,
        sql: &str,
        rows: Vec<Vec<OracleValue>>,
        options: ExecuteManyOptions,
    ) -> Result<u64> {
        self.runtime
            .block_on(self.inner.executemany(sql, rows, options))
    }

    pub fn executemany_vars(
        &mut self,
        sql: &str,
        vars: Vec<Variable>,
        num_iters: u32,
        options: ExecuteManyOptions,
    ) -> Result<u64> {
        self.runtime
            .block_on(self.inner.executemany_vars(sql, vars, num_iters, options))
    }

    pub fn fetchone(&mut self) -> Result<Option<Row>> {
        self.runtime.block_on(self.inner.fetchone())
    }

    pub fn fetchmany(&mut self, n: usize) -> Result<Vec<Row>> {
        self.runtime.block_on(self.inner.fetchmany(n))
    }

    pub fn fetchall(&mut self) -> Result<Vec<Row>> {
        self.runtime.block_on(self.inner.fetchall())
    }

    pub fn description(&self) -> Option<Vec<Column>> {
        self.inner.description()
    }

    pub fn rowcount(&self) -> u64 {
        self.inner.rowcount()
    }

    pub fn arraysize(&self) -> u32 {
        self.inner.arraysize
    }

    pub fn set_arraysize(&mut self, arraysize: u32) {
        self.inner.arraysize = arraysize;
    }

    pub fn prefetchrows(&self) -> u32 {
        self.inner.prefetchrows
    }

    pub fn set_prefetchrows(&mut self, prefetchrows: u32) {
        self.inner.prefetchrows = prefetchrows;
    }

    pub fn setinputsizes(&mut self, sizes: Vec<Option<(OracleType, u32)>>) {
        self.inner.setinputsizes(sizes)
    }

    pub fn getbatcherrors(&self) -> &[BatchError] {
        self.inner.getbatcherrors()
    }

    pub fn getarraydmlrowcounts(&self) -> &[u64] {
        self.inner.getarraydmlrowcounts()
    }

    pub fn bind_variables(&self) -> &[Variable] {
        self.inner.bind_variables()
    }

    pub fn close(&mut self) {
        self.inner.close()
    }
}

/// A blocking connection pool.
pub struct Pool {
    runtime: Arc<Runtime>,
    inner: crate::Pool,
}

impl Pool {
    /// Create a pool, opening the minimum connections eagerly.
    pub fn create(connect_params: ConnectParams, params: PoolParams) -> Result<Self> {
        let runtime = new_runtime()?;
        let inner = runtime.block_on(crate::Pool::create(connect_params, params))?;
        Ok(Self { runtime, inner })
    }

    /// Acquire a connection per the pool's get mode.
    pub fn acquire(&self) -> Result<PooledGuard> {
        let conn = self.runtime.block_on(self.inner.acquire())?;
        Ok(PooledGuard {
            runtime: self.runtime.clone(),
            conn: Some(conn),
        })
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

/// A pooled connection checked out through the blocking surface.
pub struct PooledGuard {
    runtime: Arc<Runtime>,
    conn: Option<PooledConnection>,
}

impl PooledGuard {
    /// A blocking cursor on the pooled connection.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            runtime: self.runtime.clone(),
            inner: self.connection().cursor(),
        }
    }

    fn connection(&self) -> &crate::Connection {
        self.conn
            .as_ref()
            .expect("pooled connection already released")
            .connection()
    }

    pub fn commit(&self) -> Result<()> {
        self.runtime.block_on(self.connection().commit())
    }

    pub fn rollback(&self) -> Result<()> {
        self.runtime.block_on(self.connection().rollback())
    }

    pub fn ping(&self) -> Result<()> {
        self.runtime.block_on(self.connection().ping())
    }

    /// Release back to the pool, rolling back eagerly.
    pub fn release(mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => self.runtime.block_on(conn.release()),
            None => Err(Error::interface("connection already released")),
        }
    }
}

impl Drop for PooledGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.runtime.block_on(conn.release());
        }
    }
}
