//! Core use-case services.
//!
//! # Responsibility
//! - Expose repository operations as the public contract for callers.
//! - Keep request boundaries decoupled from storage details.

pub mod person_service;
