//! Error types for response hardening.

use thiserror::Error;

/// Failures raised while hardening a single response.
#[derive(Debug, Error)]
pub enum HardenError {
    /// The OS entropy source could not produce random bytes.
    ///
    /// Callers must not fall back to a predictable nonce.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// A computed header value contained bytes not allowed in HTTP headers.
    #[error("invalid value for header {name}")]
    InvalidHeaderValue {
        /// Name of the header that could not be built.
        name: &'static str,
    },

    /// `end` was called on a response that was already finalized.
    #[error("response already finalized")]
    DoubleFinalize,

    /// The underlying sink refused the assembled body at finalize time.
    ///
    /// The declared `Content-Length` no longer describes what was sent.
    #[error("response sink rejected a {len}-byte body")]
    BodyRejected {
        /// Length of the body that was refused.
        len: usize,
    },
}

/// Errors building a [`HeaderPolicy`](crate::HeaderPolicy) from configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The configured API origin is not a usable `connect-src` origin.
    #[error("invalid API origin {origin:?}: {reason}")]
    InvalidOrigin {
        /// The rejected input.
        origin: String,
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harden_error_display() {
        let err = HardenError::EntropyUnavailable("getrandom failed".to_string());
        assert_eq!(
            err.to_string(),
            "entropy source unavailable: getrandom failed"
        );

        let err = HardenError::InvalidHeaderValue {
            name: "content-security-policy",
        };
        assert_eq!(
            err.to_string(),
            "invalid value for header content-security-policy"
        );

        let err = HardenError::BodyRejected { len: 297 };
        assert_eq!(err.to_string(), "response sink rejected a 297-byte body");
    }

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::InvalidOrigin {
            origin: "ftp://x".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid API origin \"ftp://x\": unsupported scheme"
        );
    }
}
