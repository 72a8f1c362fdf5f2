//! Devshield server library.
//!
//! An axum server for a built single-page frontend that hardens every
//! response on the way out. Exposed as a library so the router can be
//! driven directly in tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod state;

pub use app::build_router;
pub use config::{ConfigError, ServerConfig};
pub use error::AppError;
pub use state::AppState;
