//! Response hardening middleware.
//!
//! Wires the core pipeline into axum: nonce at request entry, header set
//! attached to the response, HTML bodies buffered through a
//! [`HardenedResponse`] and released once with an exact `Content-Length`.
//! Everything else streams through with the headers attached.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue, Method, StatusCode,
        header::{ACCEPT_RANGES, CONTENT_ENCODING, CONTENT_TYPE, IF_RANGE, RANGE, TRANSFER_ENCODING},
        response::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use devshield_core::{BodyMode, HardenError, HardenedResponse, HeaderSet, Nonce, ResponseSink};
use http_body_util::BodyExt;

use super::csp::CspNonce;
use crate::error::AppError;
use crate::state::AppState;

/// Harden every response passing through.
///
/// With `csp_nonce` enabled, a fresh nonce is generated per request, exposed
/// to handlers as [`CspNonce`], and the matching CSP and security headers are
/// attached. With `hide_dev_info` enabled, uncompressed HTML bodies are
/// buffered, run through the sanitizer and sent with an accurate
/// `Content-Length`.
///
/// While sanitizing, byte ranges are disabled (a partial document cannot be
/// sanitized) and `HEAD` is answered from the sanitized `GET` so both report
/// the same length.
///
/// If the nonce cannot be generated the response is served unhardened rather
/// than with a weakened policy.
pub async fn harden_response(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = state.config();
    if !config.hardening_enabled() {
        return next.run(request).await;
    }

    let headers = if config.csp_nonce {
        let nonce = match Nonce::generate_with(state.entropy()) {
            Ok(nonce) => nonce,
            Err(err) => {
                tracing::error!(error = %err, "Nonce generation failed, serving unhardened");
                return next.run(request).await;
            }
        };
        let headers = match state.policy().build_headers(&nonce) {
            Ok(headers) => headers,
            Err(err) => {
                tracing::error!(error = %err, "Header build failed, serving unhardened");
                return next.run(request).await;
            }
        };
        request.extensions_mut().insert(CspNonce(nonce));
        headers
    } else {
        HeaderSet::new()
    };

    let sanitizing = config.hide_dev_info;
    let head = request.method() == Method::HEAD;
    if sanitizing {
        request.headers_mut().remove(RANGE);
        request.headers_mut().remove(IF_RANGE);
        if head {
            *request.method_mut() = Method::GET;
        }
    }

    let mut response = next.run(request).await;
    if sanitizing {
        response.headers_mut().remove(ACCEPT_RANGES);
    }

    let buffer = sanitizing
        && status_allows_body(response.status())
        && is_plain_html(response.headers());
    if !buffer {
        headers.apply(response.headers_mut());
        if head {
            *response.body_mut() = Body::empty();
        }
        return response;
    }

    let (parts, mut body) = response.into_parts();
    let mut hardened =
        HardenedResponse::begin(ResponseWriter::new(parts), &headers, BodyMode::Sanitize);

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                // Trailers are not forwarded.
                if let Ok(data) = frame.into_data() {
                    hardened.write(data);
                }
            }
            Err(err) => {
                let buffered = hardened.buffered_len();
                drop(hardened.discard());
                tracing::warn!(buffered_bytes = buffered, "Upstream body failed mid-stream");
                let mut response = AppError::ResponseBody(err.to_string()).into_response();
                headers.apply(response.headers_mut());
                return response;
            }
        }
    }

    if let Err(err) = hardened.end(None) {
        tracing::warn!(error = %err, "Response finalize failed");
    }

    let mut response = hardened.into_inner().into_response();
    if head {
        // Content-Length stays: it describes the body a GET would receive.
        *response.body_mut() = Body::empty();
    }
    response
}

/// Statuses that never carry a body.
fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// `text/html` that the sanitizer can read as-is.
fn is_plain_html(headers: &axum::http::HeaderMap) -> bool {
    let is_html = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"));

    is_html && !headers.contains_key(CONTENT_ENCODING)
}

/// [`ResponseSink`] over an axum response under construction.
///
/// Holds the response head and collects the body until `end`.
#[derive(Debug)]
pub struct ResponseWriter {
    parts: Parts,
    body: BytesMut,
    ended: bool,
}

impl ResponseWriter {
    /// Start writing a response with the given head.
    #[must_use]
    pub fn new(mut parts: Parts) -> Self {
        // The body is re-sent with an explicit Content-Length.
        parts.headers.remove(TRANSFER_ENCODING);
        Self {
            parts,
            body: BytesMut::new(),
            ended: false,
        }
    }

    /// Returns `true` once `end` has been called.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }
}

impl ResponseSink for ResponseWriter {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.parts.headers.insert(name, value);
    }

    fn remove_header(&mut self, name: &HeaderName) {
        self.parts.headers.remove(name);
    }

    fn write(&mut self, chunk: Bytes) -> bool {
        if self.ended {
            return false;
        }
        self.body.extend_from_slice(&chunk);
        true
    }

    fn end(&mut self, chunk: Option<Bytes>) -> Result<(), HardenError> {
        if self.ended {
            return Err(HardenError::DoubleFinalize);
        }
        if let Some(chunk) = chunk {
            self.body.extend_from_slice(&chunk);
        }
        self.ended = true;
        Ok(())
    }
}

impl IntoResponse for ResponseWriter {
    fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body.freeze()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::{
        Router,
        http::header::{CONTENT_LENGTH, CONTENT_SECURITY_POLICY},
        middleware,
        response::Html,
        routing::get,
    };
    use devshield_core::NonceSource;
    use futures_util::stream;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;

    struct BrokenEntropy;

    impl NonceSource for BrokenEntropy {
        fn fill(&self, _buf: &mut [u8]) -> Result<(), HardenError> {
            Err(HardenError::EntropyUnavailable("no device".to_string()))
        }
    }

    const DEV_PAGE: &str = "<html><head><script type=\"module\" src=\"/@vite/client\"></script>\n\n<!-- dev --></head><body>hi</body></html>";

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/", get(|| async { Html(DEV_PAGE) }))
            .route(
                "/app.js",
                get(|| async { ([(CONTENT_TYPE, "text/javascript")], "/* <!-- keep --> */") }),
            )
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
            .route(
                "/range",
                get(|request: Request| async move {
                    let range = request.headers().contains_key(RANGE);
                    (
                        [(ACCEPT_RANGES, "bytes"), (CONTENT_TYPE, "text/html")],
                        format!("<p>range={range}</p><!-- dev -->"),
                    )
                }),
            )
            .route(
                "/stream",
                get(|| async {
                    let chunks = ["line 1\n", "line 2\n"]
                        .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())));
                    ([(CONTENT_TYPE, "text/plain")], Body::from_stream(stream::iter(chunks)))
                }),
            )
            .route(
                "/nonce",
                get(|nonce: Option<CspNonce>| async move {
                    nonce.map_or_else(String::new, |n| n.value().to_string())
                }),
            )
            .layer(middleware::from_fn_with_state(state, harden_response))
    }

    async fn get_path(app: Router, path: &str) -> Response {
        app.oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send(app: Router, request: Request) -> Response {
        app.oneshot(request).await.unwrap()
    }

    fn content_length(response: &Response) -> usize {
        response.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_status_allows_body() {
        assert!(status_allows_body(StatusCode::OK));
        assert!(status_allows_body(StatusCode::NOT_FOUND));
        assert!(!status_allows_body(StatusCode::NO_CONTENT));
        assert!(!status_allows_body(StatusCode::NOT_MODIFIED));
        assert!(!status_allows_body(StatusCode::CONTINUE));
    }

    #[test]
    fn test_is_plain_html() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("Text/HTML; charset=utf-8"));
        assert!(is_plain_html(&headers));

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(!is_plain_html(&headers));

        headers.remove(CONTENT_ENCODING);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_plain_html(&headers));
    }

    #[test]
    fn test_response_writer_rejects_second_end() {
        let (parts, ()) = Response::new(()).into_parts();
        let mut writer = ResponseWriter::new(parts);
        assert!(writer.write(Bytes::from_static(b"a")));
        writer.end(Some(Bytes::from_static(b"b"))).unwrap();
        assert!(writer.is_ended());
        assert!(matches!(writer.end(None), Err(HardenError::DoubleFinalize)));
        assert!(!writer.write(Bytes::from_static(b"c")));
        assert_eq!(&writer.body[..], b"ab");
    }

    #[tokio::test]
    async fn test_html_is_hardened() {
        let response = get_path(app(AppState::new(config(&[]))), "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_some());
        let length: usize = response.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();

        let body = body_string(response).await;
        assert_eq!(body.len(), length);
        assert!(!body.contains("/@vite/client"));
        assert!(!body.contains("<!--"));
        assert!(body.contains("<body>hi</body>"));
    }

    #[tokio::test]
    async fn test_non_html_passes_through() {
        let response = get_path(app(AppState::new(config(&[]))), "/app.js").await;
        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_some());
        assert_eq!(body_string(response).await, "/* <!-- keep --> */");
    }

    #[tokio::test]
    async fn test_nonce_exposed_to_handlers() {
        let response = get_path(app(AppState::new(config(&[]))), "/nonce").await;
        let csp = response.headers()[CONTENT_SECURITY_POLICY].to_str().unwrap().to_string();
        let nonce = body_string(response).await;

        assert_eq!(nonce.len(), Nonce::LENGTH);
        assert!(csp.contains(&format!("'nonce-{nonce}'")));
    }

    #[tokio::test]
    async fn test_no_content_gets_headers_only() {
        let response = get_path(app(AppState::new(config(&[]))), "/empty").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_some());
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_entropy_failure_serves_unhardened() {
        let state = AppState::with_entropy(config(&[]), Arc::new(BrokenEntropy));
        let response = get_path(app(state), "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_none());
        assert_eq!(body_string(response).await, DEV_PAGE);
    }

    #[tokio::test]
    async fn test_both_features_disabled() {
        let state = AppState::new(config(&[
            ("DEVSHIELD_CSP_NONCE", "off"),
            ("DEVSHIELD_HIDE_DEV_INFO", "off"),
        ]));
        let response = get_path(app(state), "/").await;

        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_none());
        assert_eq!(body_string(response).await, DEV_PAGE);
    }

    #[tokio::test]
    async fn test_sanitize_without_headers() {
        let state = AppState::new(config(&[("DEVSHIELD_CSP_NONCE", "off")]));
        let app = app(state);

        let response = get_path(app.clone(), "/").await;
        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_none());
        assert!(!body_string(response).await.contains("/@vite/client"));

        let response = get_path(app, "/nonce").await;
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_headers_without_sanitize() {
        let state = AppState::new(config(&[("DEVSHIELD_HIDE_DEV_INFO", "off")]));
        let response = get_path(app(state), "/").await;

        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_some());
        assert_eq!(body_string(response).await, DEV_PAGE);
    }

    #[tokio::test]
    async fn test_range_removed_while_sanitizing() {
        let request = Request::builder()
            .uri("/range")
            .header(RANGE, "bytes=0-3")
            .body(Body::empty())
            .unwrap();
        let response = send(app(AppState::new(config(&[]))), request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(ACCEPT_RANGES).is_none());
        assert_eq!(body_string(response).await, "<p>range=false</p>");
    }

    #[tokio::test]
    async fn test_range_kept_without_sanitizing() {
        let state = AppState::new(config(&[("DEVSHIELD_HIDE_DEV_INFO", "off")]));
        let request = Request::builder()
            .uri("/range")
            .header(RANGE, "bytes=0-3")
            .body(Body::empty())
            .unwrap();
        let response = send(app(state), request).await;

        assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
        assert_eq!(body_string(response).await, "<p>range=true</p><!-- dev -->");
    }

    #[tokio::test]
    async fn test_head_reports_sanitized_length() {
        let app = app(AppState::new(config(&[])));
        let get_response = get_path(app.clone(), "/").await;
        let get_length = content_length(&get_response);
        assert_eq!(body_string(get_response).await.len(), get_length);

        let head = Request::builder()
            .method(Method::HEAD)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let head_response = send(app, head).await;

        assert_eq!(head_response.status(), StatusCode::OK);
        assert_eq!(content_length(&head_response), get_length);
        assert!(get_length < DEV_PAGE.len());
        assert!(body_string(head_response).await.is_empty());
    }

    #[tokio::test]
    async fn test_non_html_is_streamed() {
        let response = get_path(app(AppState::new(config(&[]))), "/stream").await;

        assert!(response.headers().get(CONTENT_SECURITY_POLICY).is_some());
        // Not collected by the middleware, so no length is invented.
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(body_string(response).await, "line 1\nline 2\n");
    }
}
