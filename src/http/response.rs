//! HTTP/1.1 responses.
//!
//! The server side uses the fluent builder and [`Response::into_bytes`]; the
//! client side assembles one from what its HTTP stack received.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;

use super::headers::names;
use super::{Headers, StatusCode};

/// An HTTP/1.1 response.
///
/// ```
/// use cachelens::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"id":1}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.ends_with("Content-Length: 8\r\n\r\n{\"id\":1}"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place, for middleware that decorates a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type` accordingly.
    ///
    /// Falls back to a `500` when serialization fails, which cannot happen for
    /// the plain data types the REST resource returns.
    pub fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header(names::CONTENT_TYPE, "application/json; charset=utf-8")
                .body_bytes(body),
            Err(e) => Self::new(StatusCode::InternalServerError)
                .body(format!("failed to encode response: {e}")),
        }
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Connection: keep-alive` or `Connection: close`.
    /// - `Content-Length: <n>`, always last.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains(names::CONTENT_TYPE) {
            self.headers
                .insert(names::CONTENT_TYPE, "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set(names::CONNECTION, connection);
        self.headers.remove(names::CONTENT_LENGTH);

        let head = format!("HTTP/1.1 {}\r\n{}", self.status, self.headers);
        let mut buf = BytesMut::with_capacity(head.len() + 32 + content_length);
        buf.put(head.as_bytes());
        buf.put(format!("{}: {content_length}\r\n\r\n", names::CONTENT_LENGTH).as_bytes());
        buf.put(self.body);

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn created_with_location() {
        let r = Response::new(StatusCode::Created).header("Location", "/api/car/4");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(s.contains("Location: /api/car/4\r\n"));
        assert!(s.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn not_modified_has_no_content_type() {
        let r = Response::new(StatusCode::NotModified).header("ETag", "W/\"v3\"");
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("ETag: W/\"v3\"\r\n"));
    }

    #[test]
    fn json_sets_content_type() {
        let r = Response::json(StatusCode::Ok, &vec![1, 2, 3]);
        assert_eq!(
            r.headers().get("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(r.body_ref().as_ref(), b"[1,2,3]");
    }

    #[test]
    fn connection_header_follows_keep_alive() {
        let s = to_string(Response::new(StatusCode::NoContent).keep_alive(false).into_bytes());
        assert!(s.contains("Connection: close\r\n"));
        let s = to_string(Response::new(StatusCode::NoContent).into_bytes());
        assert!(s.contains("Connection: keep-alive\r\n"));
    }
}
