//! Person store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the six person operations over the canonical `persons` table.
//! - Own the merge-update transaction boundary.
//! - Keep SQL and row mapping inside the persistence boundary.
//!
//! # Invariants
//! - "Not found" is an `Ok` outcome (`None` / `false`), never an error.
//! - Write paths call `PersonProperties::validate()` before SQL mutations.
//! - `update_person` reads, merges and writes inside one `BEGIN IMMEDIATE`
//!   transaction and always rolls back on failure or interrupt.

use crate::context::{CallContext, Interrupt};
use crate::db::{ConnectionPool, DbError, PooledConnection};
use crate::model::person::{Person, PersonId, PersonProperties, PersonValidationError};
use log::{debug, error, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

const PERSON_SELECT_SQL: &str = "SELECT
    id,
    name,
    age,
    address,
    work
FROM persons";

const PERSON_RETURNING_SQL: &str = "RETURNING id, name, age, address, work";

pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Constraint,
    Transaction,
    Query,
    Cancelled,
}

/// Properties rejected either in-process or by a store constraint.
#[derive(Debug)]
pub enum ConstraintError {
    Validation(PersonValidationError),
    Store(rusqlite::Error),
}

impl Display for ConstraintError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "constraint violated: {err}"),
        }
    }
}

impl Error for ConstraintError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

/// Failure of the transaction machinery itself.
#[derive(Debug)]
pub enum TransactionError {
    Begin(rusqlite::Error),
    Commit(rusqlite::Error),
    /// Rolling back a transaction that had nothing to write failed.
    Rollback(rusqlite::Error),
    /// A step failed and the rollback that followed failed as well.
    Aborted {
        cause: Box<StoreError>,
        rollback: rusqlite::Error,
    },
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin(err) => write!(f, "begin transaction: {err}"),
            Self::Commit(err) => write!(f, "commit transaction: {err}"),
            Self::Rollback(err) => write!(f, "rollback transaction: {err}"),
            Self::Aborted { cause, rollback } => {
                write!(f, "{cause}; rollback transaction: {rollback}")
            }
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Begin(err) | Self::Commit(err) | Self::Rollback(err) => Some(err),
            Self::Aborted { cause, .. } => Some(cause.as_ref()),
        }
    }
}

/// Error returned by person store operations.
#[derive(Debug)]
pub enum StoreError {
    Connectivity(DbError),
    Constraint(ConstraintError),
    Transaction(TransactionError),
    Query(DbError),
    Interrupted(Interrupt),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Constraint(_) => ErrorKind::Constraint,
            Self::Transaction(_) => ErrorKind::Transaction,
            Self::Query(_) => ErrorKind::Query,
            Self::Interrupted(_) => ErrorKind::Cancelled,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connectivity(err) => write!(f, "store unreachable: {err}"),
            Self::Constraint(err) => write!(f, "{err}"),
            Self::Transaction(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "query failed: {err}"),
            Self::Interrupted(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connectivity(err) | Self::Query(err) => Some(err),
            Self::Constraint(err) => Some(err),
            Self::Transaction(err) => Some(err),
            Self::Interrupted(err) => Some(err),
        }
    }
}

impl From<PersonValidationError> for StoreError {
    fn from(value: PersonValidationError) -> Self {
        Self::Constraint(ConstraintError::Validation(value))
    }
}

impl From<Interrupt> for StoreError {
    fn from(value: Interrupt) -> Self {
        Self::Interrupted(value)
    }
}

impl From<TransactionError> for StoreError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            DbError::PoolClosed | DbError::Pool(_) => Self::Connectivity(value),
            DbError::UnsupportedSchemaVersion { .. } => Self::Query(value),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                Self::Constraint(ConstraintError::Store(value))
            }
            Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase) => {
                Self::Connectivity(DbError::Sqlite(value))
            }
            Some(ErrorCode::OperationInterrupted) => Self::Interrupted(Interrupt::Cancelled),
            _ => Self::Query(DbError::Sqlite(value)),
        }
    }
}

/// Pagination window for [`PersonStore::list_persons`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersonListQuery {
    /// Number of rows to skip.
    pub offset: u64,
    /// Maximum rows to return; `None` is unbounded.
    pub limit: Option<u64>,
}

impl PersonListQuery {
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }
}

/// Capability interface over person persistence.
///
/// Implemented by [`SqlitePersonStore`] and by test doubles.
pub trait PersonStore: Send + Sync {
    /// Verifies the store answers a round-trip.
    fn health_check(&self, ctx: &CallContext) -> StoreResult<()>;
    /// Lists persons in id order; an empty page is `Ok(vec![])`.
    fn list_persons(&self, ctx: &CallContext, query: &PersonListQuery)
        -> StoreResult<Vec<Person>>;
    /// Inserts a new row and returns it with its assigned id.
    fn create_person(&self, ctx: &CallContext, properties: &PersonProperties)
        -> StoreResult<Person>;
    /// Returns `Ok(None)` when no row has `id`.
    fn get_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<Option<Person>>;
    /// Merges the supplied fields of `target.properties` onto row `target.id`.
    ///
    /// Returns `Ok(None)` when no row has that id.
    fn update_person(&self, ctx: &CallContext, target: &Person) -> StoreResult<Option<Person>>;
    /// Returns `Ok(false)` when no row has `id`.
    fn delete_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<bool>;
}

impl<S: PersonStore + ?Sized> PersonStore for Arc<S> {
    fn health_check(&self, ctx: &CallContext) -> StoreResult<()> {
        (**self).health_check(ctx)
    }

    fn list_persons(
        &self,
        ctx: &CallContext,
        query: &PersonListQuery,
    ) -> StoreResult<Vec<Person>> {
        (**self).list_persons(ctx, query)
    }

    fn create_person(
        &self,
        ctx: &CallContext,
        properties: &PersonProperties,
    ) -> StoreResult<Person> {
        (**self).create_person(ctx, properties)
    }

    fn get_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<Option<Person>> {
        (**self).get_person(ctx, id)
    }

    fn update_person(&self, ctx: &CallContext, target: &Person) -> StoreResult<Option<Person>> {
        (**self).update_person(ctx, target)
    }

    fn delete_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<bool> {
        (**self).delete_person(ctx, id)
    }
}

/// SQLite-backed person store over a shared connection pool.
#[derive(Clone)]
pub struct SqlitePersonStore {
    pool: ConnectionPool,
}

impl SqlitePersonStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn acquire(&self, ctx: &CallContext) -> StoreResult<PooledConnection> {
        ctx.check()?;
        Ok(self.pool.get(ctx)?)
    }
}

impl PersonStore for SqlitePersonStore {
    fn health_check(&self, ctx: &CallContext) -> StoreResult<()> {
        logged("health_check", ctx, || {
            let conn = self.acquire(ctx)?;
            conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn list_persons(
        &self,
        ctx: &CallContext,
        query: &PersonListQuery,
    ) -> StoreResult<Vec<Person>> {
        logged("list_persons", ctx, || {
            let conn = self.acquire(ctx)?;
            let mut stmt = conn.prepare_cached(&format!(
                "{PERSON_SELECT_SQL} ORDER BY id ASC LIMIT ?1 OFFSET ?2;"
            ))?;
            // SQLite treats a negative LIMIT as unbounded.
            let limit = query.limit.map_or(-1, saturating_i64);
            let mut rows = stmt.query(params![limit, saturating_i64(query.offset)])?;

            let mut persons = Vec::new();
            while let Some(row) = rows.next()? {
                persons.push(parse_person_row(row)?);
            }
            Ok(persons)
        })
    }

    fn create_person(
        &self,
        ctx: &CallContext,
        properties: &PersonProperties,
    ) -> StoreResult<Person> {
        logged("create_person", ctx, || {
            properties.validate()?;

            let conn = self.acquire(ctx)?;
            let person = conn.query_row(
                &format!(
                    "INSERT INTO persons (name, age, address, work)
                     VALUES (?1, ?2, ?3, ?4)
                     {PERSON_RETURNING_SQL};"
                ),
                params![
                    properties.name.as_str(),
                    properties.age,
                    properties.address.as_str(),
                    properties.work.as_str(),
                ],
                parse_person_row,
            )?;
            Ok(person)
        })
    }

    fn get_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<Option<Person>> {
        logged("get_person", ctx, || {
            let conn = self.acquire(ctx)?;
            Ok(select_person(&conn, id)?)
        })
    }

    fn update_person(&self, ctx: &CallContext, target: &Person) -> StoreResult<Option<Person>> {
        logged("update_person", ctx, || {
            let mut conn = self.acquire(ctx)?;
            let outcome =
                run_serializable(&mut conn, ctx, |tx| update_person_tx(tx, ctx, target));
            close_open_transaction(&conn);
            outcome
        })
    }

    /// Not-found is detected from the affected-row count of the single
    /// `DELETE` statement; there is no separate existence check.
    fn delete_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<bool> {
        logged("delete_person", ctx, || {
            let conn = self.acquire(ctx)?;
            let changed = conn.execute("DELETE FROM persons WHERE id = ?1;", [id])?;
            Ok(changed > 0)
        })
    }
}

/// Runs `body` in a `BEGIN IMMEDIATE` transaction.
///
/// `Ok(Some(_))` commits, `Ok(None)` rolls back and reports not found, and an
/// error rolls back; a failing rollback is folded into
/// `TransactionError::Aborted` together with the original cause.
fn run_serializable<T>(
    conn: &mut Connection,
    ctx: &CallContext,
    body: impl FnOnce(&Transaction<'_>) -> StoreResult<Option<T>>,
) -> StoreResult<Option<T>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(TransactionError::Begin)?;

    let outcome = body(&tx).and_then(|value| {
        ctx.check()?;
        Ok(value)
    });

    match outcome {
        Ok(Some(value)) => {
            tx.commit().map_err(TransactionError::Commit)?;
            Ok(Some(value))
        }
        Ok(None) => {
            tx.rollback().map_err(TransactionError::Rollback)?;
            Ok(None)
        }
        Err(cause) => match tx.rollback() {
            Ok(()) => Err(cause),
            Err(rollback) => Err(TransactionError::Aborted {
                cause: Box::new(cause),
                rollback,
            }
            .into()),
        },
    }
}

fn update_person_tx(
    tx: &Transaction<'_>,
    ctx: &CallContext,
    target: &Person,
) -> StoreResult<Option<Person>> {
    ctx.check()?;
    let Some(mut current) = select_person(tx, target.id)? else {
        return Ok(None);
    };

    current.update_by(&target.properties);
    current.properties.validate()?;

    ctx.check()?;
    let updated = tx.query_row(
        &format!(
            "UPDATE persons
             SET
                name = ?1,
                age = ?2,
                address = ?3,
                work = ?4
             WHERE id = ?5
             {PERSON_RETURNING_SQL};"
        ),
        params![
            current.properties.name.as_str(),
            current.properties.age,
            current.properties.address.as_str(),
            current.properties.work.as_str(),
            current.id,
        ],
        parse_person_row,
    )?;
    Ok(Some(updated))
}

fn select_person(conn: &Connection, id: PersonId) -> rusqlite::Result<Option<Person>> {
    conn.query_row(
        &format!("{PERSON_SELECT_SQL} WHERE id = ?1;"),
        [id],
        parse_person_row,
    )
    .optional()
}

fn parse_person_row(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get("id")?,
        properties: PersonProperties {
            name: row.get("name")?,
            age: row.get("age")?,
            address: row.get("address")?,
            work: row.get("work")?,
        },
    })
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A failed `COMMIT` or `ROLLBACK` leaves the rollback to `Transaction`'s
/// drop. The connection must not go back to the pool mid-transaction.
fn close_open_transaction(conn: &Connection) {
    if conn.is_autocommit() {
        return;
    }
    if let Err(err) = conn.execute_batch("ROLLBACK;") {
        error!("event=tx_cleanup module=repo status=error error={err}");
    }
}

/// Pool and lock waits are cut off at the caller deadline. Once the context
/// is interrupted, such a timeout is reported as the interrupt itself.
fn interrupted_wait(err: StoreError, ctx: &CallContext) -> StoreError {
    if !is_wait_timeout(&err) {
        return err;
    }
    match ctx.check() {
        Err(interrupt) => StoreError::Interrupted(interrupt),
        Ok(()) => err,
    }
}

fn is_wait_timeout(err: &StoreError) -> bool {
    let sqlite = match err {
        StoreError::Connectivity(DbError::Pool(_)) => return true,
        StoreError::Query(DbError::Sqlite(err))
        | StoreError::Transaction(TransactionError::Begin(err) | TransactionError::Commit(err)) => {
            err
        }
        _ => return false,
    };
    matches!(
        sqlite.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn logged<T>(
    operation: &'static str,
    ctx: &CallContext,
    call: impl FnOnce() -> StoreResult<T>,
) -> StoreResult<T> {
    let started_at = Instant::now();
    let result = call().map_err(|err| interrupted_wait(err, ctx));
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => debug!(
            "event=store_call module=repo status=ok op={operation} duration_ms={duration_ms}"
        ),
        Err(err) => match err.kind() {
            ErrorKind::Constraint | ErrorKind::Cancelled => warn!(
                "event=store_call module=repo status=error op={operation} kind={:?} duration_ms={duration_ms} error={err}",
                err.kind()
            ),
            _ => error!(
                "event=store_call module=repo status=error op={operation} kind={:?} duration_ms={duration_ms} error={err}",
                err.kind()
            ),
        },
    }
    result
}
