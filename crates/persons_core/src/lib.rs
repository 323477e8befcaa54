//! Core persistence and use-case logic for the persons service.
//! This crate is the single source of truth for person storage invariants.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use context::{CallContext, Interrupt};
pub use db::{open_pool, open_pool_in_memory, ConnectionPool, DbError, PoolOptions};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::person::{Person, PersonId, PersonProperties, PersonValidationError};
pub use repo::person_repo::{
    ConstraintError, ErrorKind, PersonListQuery, PersonStore, SqlitePersonStore, StoreError,
    StoreResult, TransactionError,
};
pub use service::person_service::PersonService;
