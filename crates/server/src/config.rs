//! Server configuration loaded from environment variables.
//!
//! Loaded once at startup, validated, and passed explicitly from then on.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `DEVSHIELD_HOST` - Bind address (default: 127.0.0.1)
//! - `DEVSHIELD_PORT` - Listen port (default: 5173)
//! - `DEVSHIELD_ROOT` - Directory of built frontend assets (default: dist)
//! - `DEVSHIELD_API_ORIGINS` - Comma-separated `connect-src` origins
//!   (default: `http://localhost:8000,http://127.0.0.1:8000`)
//! - `DEVSHIELD_CSP_NONCE` - Attach the nonce CSP and security headers (default: true)
//! - `DEVSHIELD_HIDE_DEV_INFO` - Strip dev-only markup from HTML (default: true)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use devshield_core::{ApiOrigin, HeaderPolicy, PolicyError};
use thiserror::Error;

const DEFAULT_API_ORIGINS: &str = "http://localhost:8000,http://127.0.0.1:8000";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid DEVSHIELD_API_ORIGINS entry: {0}")]
    InvalidOrigin(#[from] PolicyError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory served as the frontend root
    pub root: PathBuf,
    /// Origins the frontend may `fetch`/`WebSocket` to
    pub api_origins: Vec<ApiOrigin>,
    /// Attach the per-request CSP and companion security headers
    pub csp_nonce: bool,
    /// Remove development-only markup from HTML bodies
    pub hide_dev_info: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = get_or_default(&lookup, "DEVSHIELD_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("DEVSHIELD_HOST".to_string(), e.to_string()))?;
        let port = get_or_default(&lookup, "DEVSHIELD_PORT", "5173")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("DEVSHIELD_PORT".to_string(), e.to_string()))?;
        let root = PathBuf::from(get_or_default(&lookup, "DEVSHIELD_ROOT", "dist"));
        let api_origins =
            parse_origins(&get_or_default(&lookup, "DEVSHIELD_API_ORIGINS", DEFAULT_API_ORIGINS))?;
        let csp_nonce = parse_bool(
            "DEVSHIELD_CSP_NONCE",
            &get_or_default(&lookup, "DEVSHIELD_CSP_NONCE", "true"),
        )?;
        let hide_dev_info = parse_bool(
            "DEVSHIELD_HIDE_DEV_INFO",
            &get_or_default(&lookup, "DEVSHIELD_HIDE_DEV_INFO", "true"),
        )?;

        Ok(Self {
            host,
            port,
            root,
            api_origins,
            csp_nonce,
            hide_dev_info,
            sentry_dsn: get_optional(&lookup, "SENTRY_DSN"),
            sentry_environment: get_optional(&lookup, "SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Build the static header policy for the configured origins.
    #[must_use]
    pub fn header_policy(&self) -> HeaderPolicy {
        HeaderPolicy::new(self.api_origins.iter().cloned())
    }

    /// Returns `true` if any response hardening is enabled.
    #[must_use]
    pub const fn hardening_enabled(&self) -> bool {
        self.csp_nonce || self.hide_dev_info
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a non-empty variable, treating blank values as unset.
fn get_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// Get a variable with a default value.
///
/// Unlike [`get_optional`], an empty string is kept: an empty
/// `DEVSHIELD_API_ORIGINS` means "no API origins".
fn get_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got {other:?}"),
        )),
    }
}

fn parse_origins(value: &str) -> Result<Vec<ApiOrigin>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| ApiOrigin::parse(s).map_err(ConfigError::from))
        .collect()
}
