//! Domain model for the person resource.
//!
//! # Responsibility
//! - Define canonical data structures shared by persistence and callers.
//!
//! # Invariants
//! - Storage representation never leaks out of the `repo` layer.

pub mod person;
