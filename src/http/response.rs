//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder for responses, JSON bodies included, and
//! serializes them to a byte buffer for transmission over TCP.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::error;

use super::{Headers, StatusCode};

const JSON_CONTENT_TYPE: &str = "application/json";

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use duetodo::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Created, &serde_json::json!({"ok": true}));
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with("\r\n\r\n{\"ok\":true}"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Creates a JSON response by serializing `value`.
    ///
    /// A value that fails to serialize yields a `500` instead.
    pub fn json<T>(status: StatusCode, value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status).json_body(body),
            Err(e) => {
                error!(error = %e, "failed to serialize response body");
                Self::new(StatusCode::InternalServerError).body("response serialization failed")
            }
        }
    }

    /// Sets an already-encoded JSON body and the matching `Content-Type`.
    #[must_use]
    pub fn json_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.headers.set("Content-Type", JSON_CONTENT_TYPE);
        self.body = body.into();
        self
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written).
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_slice());

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
