//! HTTP middleware stack for the server.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, added in `main`)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (record in span, echo in response)
//! 4. Response hardening (nonce, security headers, body sanitizing)

pub mod csp;
pub mod harden;
pub mod request_id;

pub use csp::CspNonce;
pub use harden::{ResponseWriter, harden_response};
pub use request_id::request_id_middleware;
