//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite pools.
//! - Configure connection pragmas required by store behavior.
//! - Apply schema migrations before the pool hands out a connection.
//!
//! # Invariants
//! - Pooled connections have `foreign_keys=ON` and a busy timeout.
//! - File databases run in WAL journal mode.
//! - No connection is handed out before migrations are applied.

use super::migrations::apply_migrations;
use super::pool::ConnectionPool;
use super::DbResult;
use crate::context::CallContext;
use log::{error, info};
use r2d2::ManageConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Tuning knobs for [`open_pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Upper bound on simultaneously open connections.
    pub max_size: usize,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 4,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Opens a pool over a SQLite database file and applies pending migrations.
///
/// # Side effects
/// - Creates the database file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_pool(path: impl AsRef<Path>, options: PoolOptions) -> DbResult<ConnectionPool> {
    let busy_timeout = options.busy_timeout;
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(move |conn| bootstrap_connection(conn, busy_timeout, true));

    open_logged("file", options, move || {
        // Migrate on a direct connection first so a bad path or a newer
        // schema fails here instead of being retried by the pool.
        let mut conn = manager.connect()?;
        apply_migrations(&mut conn)?;
        drop(conn);

        let pool = pool_builder(options).build(manager)?;
        Ok(ConnectionPool::new(
            pool,
            options.acquire_timeout,
            options.busy_timeout,
        ))
    })
}

/// Opens a single-connection pool over a fresh in-memory database.
///
/// Every SQLite in-memory connection is its own database, so the pool holds
/// exactly one connection and never recycles it.
pub fn open_pool_in_memory() -> DbResult<ConnectionPool> {
    let options = PoolOptions {
        max_size: 1,
        ..PoolOptions::default()
    };
    let busy_timeout = options.busy_timeout;
    let manager = SqliteConnectionManager::memory()
        .with_init(move |conn| bootstrap_connection(conn, busy_timeout, false));

    open_logged("memory", options, move || {
        let pool = pool_builder(options)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        let pool = ConnectionPool::new(pool, options.acquire_timeout, options.busy_timeout);

        let mut conn = pool.get(&CallContext::background())?;
        apply_migrations(&mut conn)?;
        drop(conn);
        Ok(pool)
    })
}

fn pool_builder(options: PoolOptions) -> r2d2::Builder<SqliteConnectionManager> {
    let max_size = u32::try_from(options.max_size.max(1)).unwrap_or(u32::MAX);
    r2d2::Pool::builder()
        .max_size(max_size)
        .connection_timeout(options.acquire_timeout.max(Duration::from_millis(1)))
}

fn open_logged(
    mode: &'static str,
    options: PoolOptions,
    open: impl FnOnce() -> DbResult<ConnectionPool>,
) -> DbResult<ConnectionPool> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    match open() {
        Ok(pool) => {
            info!(
                "event=db_open module=db status=ok mode={mode} max_connections={} duration_ms={}",
                options.max_size.max(1),
                started_at.elapsed().as_millis()
            );
            Ok(pool)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Runs on every connection the pool opens.
fn bootstrap_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    wal: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    if wal {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
    }
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}
