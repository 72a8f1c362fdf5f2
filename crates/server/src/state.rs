//! Application state shared across handlers and middleware.

use std::sync::Arc;

use devshield_core::{HeaderPolicy, NonceSource, OsEntropy};

use crate::config::ServerConfig;

/// Application state shared across all requests.
///
/// Cheaply cloneable via `Arc`. Everything inside is read-only once built.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    policy: Arc<HeaderPolicy>,
    entropy: Arc<dyn NonceSource>,
}

impl AppState {
    /// Create application state drawing nonces from the OS CSPRNG.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_entropy(config, Arc::new(OsEntropy))
    }

    /// Create application state with a specific nonce entropy source.
    #[must_use]
    pub fn with_entropy(config: ServerConfig, entropy: Arc<dyn NonceSource>) -> Self {
        let policy = Arc::new(config.header_policy());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                policy,
                entropy,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get the static header policy.
    #[must_use]
    pub fn policy(&self) -> &HeaderPolicy {
        &self.inner.policy
    }

    /// Get the nonce entropy source.
    #[must_use]
    pub fn entropy(&self) -> &dyn NonceSource {
        self.inner.entropy.as_ref()
    }
}
