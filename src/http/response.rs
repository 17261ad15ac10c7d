//! HTTP/1.1 response builder and handler reply conversions.
//!
//! [`Response`] is a fluent builder serialized to wire bytes for
//! transmission over TCP. [`IntoReply`] lets route handlers return plain
//! strings or full responses interchangeably.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use tinyrest::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("X-Mock", "yes")
///     .body("coucou");
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 6\r\n"));
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

    /// Creates a `200 OK` plain-text response.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok).body(body)
    }

    /// Creates a `200 OK` response with `value` serialized as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if `value` cannot be
    /// serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde::Serialize;
    /// use tinyrest::Response;
    ///
    /// #[derive(Serialize)]
    /// struct Greeting { text: String }
    ///
    /// let response = Response::json(&Greeting { text: "coucou".into() }).unwrap();
    /// assert_eq!(response.body_ref(), br#"{"text":"coucou"}"#);
    /// ```
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(StatusCode::Ok)
            .header("Content-Type", "application/json")
            .body_bytes(body))
    }

    /// Appends a response header. Repeated calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// `Content-Length` is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
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

    /// Returns the response body bytes.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty
    ///   and no `Content-Type` was set.
    /// - `Content-Length: <n>` (always written).
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .append("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

/// Conversion of handler return values into a [`Response`].
///
/// Strings are written verbatim as a `200 OK` text body; a `Result` carrying
/// a serialization failure becomes a `500`.
pub trait IntoReply {
    /// Converts this value into a response.
    fn into_reply(self) -> Response;
}

impl IntoReply for Response {
    fn into_reply(self) -> Response {
        self
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Response {
        Response::text(self)
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Response {
        Response::text(self)
    }
}

impl<T: IntoReply> IntoReply for Result<T, serde_json::Error> {
    fn into_reply(self) -> Response {
        match self {
            Ok(reply) => reply.into_reply(),
            Err(e) => {
                tracing::error!(error = %e, "reply serialization failed");
                Response::new(StatusCode::InternalServerError).body("serialization error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::text("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn custom_header() {
        let r = Response::new(StatusCode::Ok)
            .header("X-Request-Id", "abc-123")
            .body("ok");
        let s = to_string(r.into_bytes());
        assert!(s.contains("X-Request-Id: abc-123\r\n"));
    }

    #[test]
    fn json_sets_content_type() {
        let r = Response::json(&serde_json::json!({"Text": "coucou 0"})).unwrap();
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Type: application/json\r\n"));
        assert!(s.ends_with(r#"{"Text":"coucou 0"}"#));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::Ok).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn string_reply() {
        let r = "coucou 0".to_owned().into_reply();
        assert_eq!(r.status(), StatusCode::Ok);
        assert_eq!(r.body_ref(), b"coucou 0");
    }

    #[test]
    fn failed_json_reply_is_500() {
        let r: Result<Response, serde_json::Error> =
            serde_json::from_str::<serde_json::Value>("not json").map(|v| Response::json(&v).unwrap());
        assert_eq!(r.into_reply().status(), StatusCode::InternalServerError);
    }
}
