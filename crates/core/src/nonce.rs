//! Per-request CSP nonce generation.
//!
//! Every response gets a fresh nonce drawn directly from the operating
//! system's CSPRNG. Timestamps are never used as an entropy substitute.

use core::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::HardenError;

/// Raw random bytes per nonce. 12 bytes encode to exactly 16 base64 chars.
const NONCE_BYTES_LEN: usize = 12;

/// A source of random bytes for nonce generation.
///
/// Production code uses [`OsEntropy`]. The trait exists so the failure path
/// (`EntropyUnavailable`) can be exercised.
pub trait NonceSource: Send + Sync {
    /// Fill `buf` entirely with unpredictable bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HardenError::EntropyUnavailable`] if the source cannot
    /// produce bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), HardenError>;
}

/// The operating system's cryptographically secure random generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl NonceSource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), HardenError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| HardenError::EntropyUnavailable(e.to_string()))
    }
}

/// A CSP nonce value.
///
/// Always [`Nonce::LENGTH`] characters from the URL-safe base64 alphabet
/// (`A-Z a-z 0-9 - _`), so it is valid in a `'nonce-…'` source expression
/// and in an HTML attribute without escaping.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    /// Length of every nonce in characters.
    pub const LENGTH: usize = 16;

    /// Generate a new nonce from the OS entropy source.
    ///
    /// # Errors
    ///
    /// Returns [`HardenError::EntropyUnavailable`] if the OS source fails.
    pub fn generate() -> Result<Self, HardenError> {
        Self::generate_with(&OsEntropy)
    }

    /// Generate a new nonce from the given source.
    ///
    /// # Errors
    ///
    /// Propagates the source's error unchanged.
    pub fn generate_with(source: &(impl NonceSource + ?Sized)) -> Result<Self, HardenError> {
        let mut bytes = [0u8; NONCE_BYTES_LEN];
        source.fill(&mut bytes)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Get the nonce value for headers and templates.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Nonces end up in logs via request spans; keep them out.
impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce([REDACTED])")
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Nonce {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
