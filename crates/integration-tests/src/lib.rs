//! Integration tests for devshield.
//!
//! Tests drive the real router in-process with `tower::ServiceExt::oneshot`;
//! no socket or external service is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p devshield-integration-tests
//! ```
//!
//! # Fixtures
//!
//! `fixtures/dist` is a frontend build as a dev server would emit it, with
//! the hot-reload bootstrap and dev client still in `index.html`.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
};
use devshield_server::ServerConfig;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Root of the bundled frontend fixture.
#[must_use]
pub fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/dist")
}

/// Server configuration over the fixture root, with overrides.
///
/// # Panics
///
/// Panics if the overrides do not form a valid configuration.
#[must_use]
pub fn config(overrides: &[(&str, &str)]) -> ServerConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert(
        "DEVSHIELD_ROOT".to_string(),
        fixture_root().display().to_string(),
    );
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    ServerConfig::from_lookup(|key| vars.get(key).cloned()).expect("valid test configuration")
}

/// A fully buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as UTF-8 text.
    ///
    /// # Panics
    ///
    /// Panics if the body is not UTF-8.
    #[must_use]
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("UTF-8 body")
    }

    /// Declared `Content-Length`, if any.
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Every `'nonce-…'` value in the CSP header, in directive order.
    #[must_use]
    pub fn csp_nonces(&self) -> Vec<String> {
        self.header("content-security-policy")
            .map(|csp| {
                csp.split(['\'', ' ', ';'])
                    .filter_map(|token| token.strip_prefix("nonce-"))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Build a request with an empty body.
///
/// # Panics
///
/// Panics if `uri` is not a valid request URI.
#[must_use]
pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

/// Send one request through `app` and buffer the response.
///
/// # Panics
///
/// Panics if the router or the response body fails.
pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.expect("router is infallible");
    let (parts, body) = response.into_parts();
    let body = body.collect().await.expect("response body").to_bytes();

    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body: body.to_vec(),
    }
}

/// Shorthand for a `GET` through [`send`].
pub async fn get(app: Router, uri: &str) -> TestResponse {
    send(app, request(Method::GET, uri)).await
}
