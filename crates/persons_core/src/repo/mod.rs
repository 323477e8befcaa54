//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the person data access contract.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs report "not found" as a value, and store failures as
//!   typed `StoreError`s.

pub mod person_repo;
