//! HTTP boundary for the persons service.

pub mod app;
pub mod error;
pub mod handlers;
pub mod settings;
pub mod state;

pub use app::build_router;
