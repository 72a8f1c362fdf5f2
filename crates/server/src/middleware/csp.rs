//! CSP nonce extractor for inline script protection.
//!
//! [`harden_response`](super::harden_response) generates the nonce and stores
//! it in request extensions. Handlers that render HTML pull it out with this
//! extractor and stamp it into `<script nonce="...">` and `<style nonce="...">`.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use devshield_core::Nonce;

use crate::error::AppError;

/// The CSP nonce of the current request.
///
/// Extracting `CspNonce` fails with a 500 when header hardening is disabled or
/// the middleware is missing. Use `Option<CspNonce>` in handlers that must
/// work either way.
#[derive(Clone, Debug)]
pub struct CspNonce(pub Nonce);

impl CspNonce {
    /// Get the nonce value for use in templates.
    #[must_use]
    pub fn value(&self) -> &str {
        self.0.as_str()
    }
}

/// Extractor to get the CSP nonce from request extensions.
///
/// # Example
///
/// ```ignore
/// async fn page(nonce: CspNonce) -> Html<String> {
///     Html(format!(r#"<script nonce="{}">boot()</script>"#, nonce.value()))
/// }
/// ```
impl<S> FromRequestParts<S> for CspNonce
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            tracing::warn!(
                "CSP nonce not found in request extensions - middleware may be misconfigured"
            );
            AppError::Internal("CSP nonce missing".to_string())
        })
    }
}

impl<S> OptionalFromRequestParts<S> for CspNonce
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}
