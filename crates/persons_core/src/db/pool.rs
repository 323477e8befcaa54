//! Shared SQLite connection pool.
//!
//! # Responsibility
//! - Hand out bootstrapped connections through `r2d2`.
//! - Bound every checkout by the caller deadline.
//! - Sever the store on `close()`.
//!
//! # Invariants
//! - A closed pool never hands out a connection again.
//! - A checked-out connection never waits on a lock past the caller deadline.

use super::{DbError, DbResult};
use crate::context::CallContext;
use log::info;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Process-wide pool handle. Cloning shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    // `None` once closed; dropping the last `r2d2::Pool` handle drops its
    // idle connections, and checked-out ones go away when returned.
    inner: Arc<RwLock<Option<r2d2::Pool<SqliteConnectionManager>>>>,
    acquire_timeout: Duration,
    busy_timeout: Duration,
}

impl ConnectionPool {
    pub(crate) fn new(
        pool: r2d2::Pool<SqliteConnectionManager>,
        acquire_timeout: Duration,
        busy_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(pool))),
            acquire_timeout,
            busy_timeout,
        }
    }

    /// Checks out a connection.
    ///
    /// Waits until the pool acquire timeout or the caller deadline, whichever
    /// comes first. The connection's busy timeout is narrowed the same way so
    /// lock waits end with the deadline.
    ///
    /// # Errors
    /// - `PoolClosed` after [`ConnectionPool::close`].
    /// - `Pool` when no connection frees up in time.
    pub fn get(&self, ctx: &CallContext) -> DbResult<PooledConnection> {
        let pool = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DbError::PoolClosed)?;

        let remaining = ctx.remaining();
        let wait = remaining.map_or(self.acquire_timeout, |left| left.min(self.acquire_timeout));
        let conn = pool.get_timeout(wait)?;

        // SQLite counts the busy timeout in whole milliseconds; round up so a
        // lock wait never gives up just short of the deadline.
        let lock_wait = remaining.map_or(self.busy_timeout, |left| {
            (left + Duration::from_millis(1)).min(self.busy_timeout)
        });
        conn.busy_timeout(lock_wait)?;
        Ok(conn)
    }

    /// Closes the pool. Later checkouts fail with `PoolClosed`.
    pub fn close(&self) {
        let taken = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = taken {
            let state = pool.state();
            info!(
                "event=db_pool_close module=db status=ok connections={} idle={}",
                state.connections, state.idle_connections
            );
        }
    }
}
