//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request head.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },
}

/// A parsed HTTP/1.1 request.
///
/// [`Request::parse`] reads the request head; the server attaches the body
/// with [`Request::with_body`] once `Content-Length` bytes have arrived.
///
/// # Examples
///
/// ```
/// use duetodo::http::{Method, Request};
///
/// let raw = b"PUT /todos/42?verbose HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\n\r\n{}";
/// let (request, offset) = Request::parse(raw).unwrap();
/// let request = request.with_body(raw[offset..].to_vec());
///
/// assert_eq!(request.method(), &Method::Put);
/// assert_eq!(request.path(), "/todos/42");
/// assert_eq!(request.query_string(), Some("verbose"));
/// assert_eq!(request.content_length().unwrap(), Some(2));
/// assert_eq!(&request.body()[..], b"{}");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parses the request head at the start of `buf`.
    ///
    /// Returns the request (with an empty body) and the offset at which the
    /// body begins, immediately after the `\r\n\r\n` terminator.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the head has not fully arrived.
    /// - [`RequestError::Parse`] — the head is malformed.
    /// - [`RequestError::MissingField`] — method, path, or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(
            raw_req
                .method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path, without the query string and still
    /// percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) if conn.eq_ignore_ascii_case("close") => false,
            Some(conn) if conn.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == 1,
        }
    }

    /// Returns the declared `Content-Length`, or `None` when the header is absent.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidContentLength`] if the header is not a
    /// non-negative integer.
    pub fn content_length(&self) -> Result<Option<usize>, RequestError> {
        match self.headers.get("content-length") {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|_| {
                RequestError::InvalidContentLength {
                    value: value.to_owned(),
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET /todos HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/todos");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
        assert!(req.body().is_empty());
    }

    #[test]
    fn path_keeps_percent_encoding() {
        let raw = b"GET /todos/title/pay%20bills HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/todos/title/pay%20bills");
        assert_eq!(req.query_string(), None);
    }

    #[test]
    fn unknown_method_is_kept() {
        let raw = b"BREW /pot HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Other("BREW".into()));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn malformed_request() {
        let raw = b"GET / HTTP/9\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(RequestError::Parse(_))));
    }

    #[test]
    fn keep_alive_defaults() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST /todos HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length().unwrap(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");

        let (req, _) = Request::parse(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n").unwrap();
        assert!(matches!(
            req.content_length(),
            Err(RequestError::InvalidContentLength { .. })
        ));
    }
}
