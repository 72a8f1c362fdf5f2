//! Response interception: defer, rewrite and finalize one response.
//!
//! A server adapts its native response type to [`ResponseSink`]. For each
//! request it wraps that sink in a fresh [`HardenedResponse`], which
//! implements the same trait. Headers are attached when the wrapper is
//! created; body writes are buffered; `end` assembles, rewrites and emits the
//! body exactly once.
//!
//! No body byte reaches the inner sink before `end`.

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::error::HardenError;
use crate::policy::HeaderSet;
use crate::sanitize::sanitize_bytes;

/// The response-writing capability a server exposes for one response.
pub trait ResponseSink {
    /// Set (or replace) a response header.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Remove a response header if present.
    fn remove_header(&mut self, name: &HeaderName);

    /// Write a body chunk. Returns `false` if the chunk was not accepted.
    fn write(&mut self, chunk: Bytes) -> bool;

    /// Finalize the response, optionally writing one last chunk first.
    ///
    /// # Errors
    ///
    /// Returns [`HardenError::DoubleFinalize`] if the response was already
    /// finalized, or [`HardenError::BodyRejected`] if a wrapped sink refused
    /// the body.
    fn end(&mut self, chunk: Option<Bytes>) -> Result<(), HardenError>;
}

/// How the assembled body is treated at finalize time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Run the body through [`sanitize`](crate::sanitize()) if it is UTF-8.
    Sanitize,
    /// Send the body unchanged.
    PassThrough,
}

/// Ordered chunks of one response body, held until finalize.
#[derive(Debug, Default)]
pub struct BodyBuffer {
    chunks: Vec<Bytes>,
    len: usize,
}

impl BodyBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Total buffered bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been buffered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-empty chunks received.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenate all chunks in arrival order.
    #[must_use]
    pub fn into_bytes(mut self) -> Bytes {
        if self.chunks.len() <= 1 {
            return self.chunks.pop().unwrap_or_default();
        }
        let mut body = BytesMut::with_capacity(self.len);
        for chunk in &self.chunks {
            body.extend_from_slice(chunk);
        }
        body.freeze()
    }
}

/// A [`ResponseSink`] decorator that hardens one response.
///
/// Created once per request and never shared. Owns the body buffer.
#[derive(Debug)]
pub struct HardenedResponse<S: ResponseSink> {
    inner: S,
    buffer: BodyBuffer,
    mode: BodyMode,
    finalized: bool,
}

impl<S: ResponseSink> HardenedResponse<S> {
    /// Wrap `inner`, attaching every header in `headers` immediately.
    ///
    /// Stripped headers are removed before the new ones are set.
    pub fn begin(mut inner: S, headers: &HeaderSet, mode: BodyMode) -> Self {
        for name in headers.stripped() {
            inner.remove_header(name);
        }
        for (name, value) in headers.iter() {
            inner.set_header(name.clone(), value.clone());
        }

        Self {
            inner,
            buffer: BodyBuffer::new(),
            mode,
            finalized: false,
        }
    }

    /// Bytes buffered so far.
    #[must_use]
    pub const fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` once `end` has run.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Drop everything buffered without transmitting it.
    ///
    /// Used when the client goes away or the upstream body fails before
    /// finalize. There is no partial flush.
    #[must_use]
    pub fn discard(self) -> S {
        debug!(
            buffered_bytes = self.buffer.len(),
            chunks = self.buffer.chunk_count(),
            "Discarding unfinalized response body"
        );
        self.inner
    }

    /// Unwrap the inner sink.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn assemble(&mut self) -> Bytes {
        let raw = std::mem::take(&mut self.buffer).into_bytes();
        match self.mode {
            BodyMode::PassThrough => raw,
            BodyMode::Sanitize => match sanitize_bytes(&raw) {
                Some(html) => Bytes::from(html),
                None => {
                    debug!(bytes = raw.len(), "Body is not UTF-8, sending unchanged");
                    raw
                }
            },
        }
    }
}

impl<S: ResponseSink> ResponseSink for HardenedResponse<S> {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.set_header(name, value);
    }

    fn remove_header(&mut self, name: &HeaderName) {
        self.inner.remove_header(name);
    }

    fn write(&mut self, chunk: Bytes) -> bool {
        if self.finalized {
            return false;
        }
        self.buffer.push(chunk);
        true
    }

    fn end(&mut self, chunk: Option<Bytes>) -> Result<(), HardenError> {
        if self.finalized {
            return Err(HardenError::DoubleFinalize);
        }
        self.finalized = true;

        if let Some(chunk) = chunk {
            self.buffer.push(chunk);
        }

        let body = self.assemble();
        let len = body.len();
        self.inner.set_header(CONTENT_LENGTH, HeaderValue::from(len));
        let accepted = body.is_empty() || self.inner.write(body);

        // End the inner sink even after a refused write.
        self.inner.end(None)?;
        if accepted {
            Ok(())
        } else {
            warn!(bytes = len, "Response sink rejected the finalized body");
            Err(HardenError::BodyRejected { len })
        }
    }
}
