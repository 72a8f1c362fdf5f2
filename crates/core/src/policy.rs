//! Security header policy for hardened responses.
//!
//! [`HeaderPolicy`] is the static template, built once at startup from the
//! configured API origins. [`HeaderPolicy::build_headers`] combines it with a
//! per-request [`Nonce`] into a [`HeaderSet`].
//!
//! # CSP Policy
//!
//! Directive order is fixed:
//! ```text
//! default-src 'self';
//! script-src 'self' 'nonce-<N>';
//! style-src 'self' 'nonce-<N>';
//! img-src 'self' data: blob:;
//! font-src 'self' data:;
//! connect-src 'self' <api origins>;
//! frame-ancestors 'none';
//! base-uri 'self';
//! form-action 'self';
//! object-src 'none';
//! media-src 'self';
//! worker-src 'self';
//! manifest-src 'self';
//! upgrade-insecure-requests;
//! block-all-mixed-content;
//! frame-src 'none'
//! ```

use core::fmt;

use http::header::{
    CONTENT_SECURITY_POLICY, HeaderMap, HeaderName, HeaderValue, REFERRER_POLICY, SERVER,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use url::Url;

use crate::error::{HardenError, PolicyError};
use crate::nonce::Nonce;

/// Generic value replacing whatever `Server` header the upstream set.
pub const SERVER_NAME: &str = "WebServer";

/// Framework fingerprinting headers removed from every hardened response.
pub const FINGERPRINT_HEADERS: &[&str] = &["x-powered-by", "x-aspnet-version", "x-aspnetmvc-version"];

const PERMISSIONS_POLICY: &str = "geolocation=(), microphone=(), camera=()";

/// An origin allowed in the `connect-src` directive.
///
/// Stored in ASCII serialization (`scheme://host[:port]`), which is exactly
/// the CSP host-source form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiOrigin(String);

impl ApiOrigin {
    /// Parse an origin such as `http://localhost:8000` or `wss://api.example.com`.
    ///
    /// A single trailing `/` is tolerated. Paths, queries, fragments and
    /// credentials are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidOrigin`] if the input is not an
    /// `http`, `https`, `ws` or `wss` origin with a host.
    pub fn parse(input: &str) -> Result<Self, PolicyError> {
        let trimmed = input.trim();
        let invalid = |reason: &str| PolicyError::InvalidOrigin {
            origin: trimmed.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(invalid("unsupported scheme"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("credentials are not allowed"));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must not contain a path, query or fragment"));
        }

        Ok(Self(url.origin().ascii_serialization()))
    }

    /// Returns the serialized origin.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ApiOrigin {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Ordered set of response headers for one response.
///
/// Keys are unique; inserting an existing name replaces its value in place.
/// Also carries the header names that must be stripped from the response.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    headers: Vec<(HeaderName, HeaderValue)>,
    strip: Vec<HeaderName>,
}

impl HeaderSet {
    /// Create an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        if let Some(slot) = self.headers.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Mark a header for removal from the outgoing response.
    pub fn strip(&mut self, name: HeaderName) {
        if !self.strip.contains(&name) {
            self.strip.push(name);
        }
    }

    /// Look up a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Iterate over headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    /// Header names to remove from the response.
    #[must_use]
    pub fn stripped(&self) -> &[HeaderName] {
        &self.strip
    }

    /// Number of headers to set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns `true` if there is nothing to set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Apply this set to a header map: strip first, then set.
    pub fn apply(&self, target: &mut HeaderMap) {
        for name in &self.strip {
            target.remove(name);
        }
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Static header policy template.
///
/// Immutable after construction. Share it across requests behind an `Arc`;
/// to reconfigure, build a new policy and swap the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPolicy {
    connect_origins: Vec<ApiOrigin>,
}

impl HeaderPolicy {
    /// Create a policy allowing connections to the given API origins.
    ///
    /// Duplicate origins are dropped; order is otherwise preserved.
    #[must_use]
    pub fn new(origins: impl IntoIterator<Item = ApiOrigin>) -> Self {
        let mut connect_origins: Vec<ApiOrigin> = Vec::new();
        for origin in origins {
            if !connect_origins.contains(&origin) {
                connect_origins.push(origin);
            }
        }
        Self { connect_origins }
    }

    /// Parse a list of origin strings into a policy.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyError`] encountered.
    pub fn from_origins<I, S>(origins: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = origins
            .into_iter()
            .map(|s| ApiOrigin::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parsed))
    }

    /// The API origins permitted by `connect-src`.
    #[must_use]
    pub fn connect_origins(&self) -> &[ApiOrigin] {
        &self.connect_origins
    }

    /// Render the Content-Security-Policy value for the given nonce.
    #[must_use]
    pub fn content_security_policy(&self, nonce: &Nonce) -> String {
        let nonce_source = format!("'nonce-{nonce}'");

        let mut connect_src = String::from("connect-src 'self'");
        for origin in &self.connect_origins {
            connect_src.push(' ');
            connect_src.push_str(origin.as_str());
        }

        [
            "default-src 'self'".to_string(),
            format!("script-src 'self' {nonce_source}"),
            format!("style-src 'self' {nonce_source}"),
            "img-src 'self' data: blob:".to_string(),
            "font-src 'self' data:".to_string(),
            connect_src,
            "frame-ancestors 'none'".to_string(),
            "base-uri 'self'".to_string(),
            "form-action 'self'".to_string(),
            "object-src 'none'".to_string(),
            "media-src 'self'".to_string(),
            "worker-src 'self'".to_string(),
            "manifest-src 'self'".to_string(),
            "upgrade-insecure-requests".to_string(),
            "block-all-mixed-content".to_string(),
            "frame-src 'none'".to_string(),
        ]
        .join("; ")
    }

    /// Build the full header set for one response.
    ///
    /// Pure apart from consuming `nonce`: the same nonce always yields the
    /// same headers.
    ///
    /// # Errors
    ///
    /// Returns [`HardenError::InvalidHeaderValue`] if the rendered CSP is not
    /// a valid header value. Origins parsed through [`ApiOrigin`] never
    /// trigger this.
    pub fn build_headers(&self, nonce: &Nonce) -> Result<HeaderSet, HardenError> {
        let csp = HeaderValue::from_str(&self.content_security_policy(nonce)).map_err(|_| {
            HardenError::InvalidHeaderValue {
                name: "content-security-policy",
            }
        })?;

        let mut set = HeaderSet::new();
        set.insert(CONTENT_SECURITY_POLICY, csp);

        // Prevent MIME sniffing
        set.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

        // Prevent clickjacking
        set.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

        // Legacy XSS filter for older browsers
        set.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));

        set.insert(
            REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );

        // Cross-origin isolation
        set.insert(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("require-corp"),
        );
        set.insert(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        );
        set.insert(
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("same-origin"),
        );

        set.insert(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static(PERMISSIONS_POLICY),
        );

        // Fingerprinting: generic server name, no framework versions
        set.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
        for name in FINGERPRINT_HEADERS.iter().copied() {
            set.strip(HeaderName::from_static(name));
        }

        Ok(set)
    }
}
