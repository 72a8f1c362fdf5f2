//! Devshield Core - Response hardening primitives.
//!
//! This crate holds the per-request pieces a development server needs to
//! harden outgoing responses:
//! - [`nonce`] - Unpredictable per-request CSP nonces
//! - [`policy`] - Content-Security-Policy and companion header construction
//! - [`mod@sanitize`] - Removal of dev-only markup from HTML documents
//! - [`intercept`] - A response-writing decorator that defers and rewrites bodies
//!
//! # Architecture
//!
//! The core crate contains no I/O and knows nothing about a particular HTTP
//! server. The server crate adapts [`intercept::ResponseSink`] to its own
//! response type and installs a fresh [`intercept::HardenedResponse`] per request.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod error;
pub mod intercept;
pub mod nonce;
pub mod policy;
pub mod sanitize;

pub use error::{HardenError, PolicyError};
pub use intercept::{BodyBuffer, BodyMode, HardenedResponse, ResponseSink};
pub use nonce::{Nonce, NonceSource, OsEntropy};
pub use policy::{ApiOrigin, HeaderPolicy, HeaderSet};
pub use sanitize::{sanitize, sanitize_bytes};
