//! Request preamble handling.
//!
//! [`RequestHeader`] wraps an `http::Request<()>` parsed from the wire and
//! adds the engine-level queries the connection loop needs: whether the peer
//! can keep the connection open, and whether it expects an interim response
//! before sending its body.

use http::header::{CONNECTION, EXPECT};
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// The parsed preamble of a request: method, target, version and headers.
///
/// Immutable once parsing completes. Header names are case-insensitive and
/// repeated headers preserve insertion order, both courtesy of
/// `http::HeaderMap`.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, turning the bare preamble into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether this request allows the connection to be reused afterwards.
    ///
    /// HTTP/1.1 defaults to persistent connections unless the peer sent
    /// `Connection: close`; HTTP/1.0 requires an explicit
    /// `Connection: keep-alive`. Anything older never persists.
    pub fn keep_alive(&self) -> bool {
        match self.version() {
            Version::HTTP_11 => !has_connection_token(self.headers(), "close"),
            Version::HTTP_10 => has_connection_token(self.headers(), "keep-alive"),
            _ => false,
        }
    }

    /// Whether the peer asked for an interim `100 Continue` before it sends
    /// the request body.
    pub fn expects_continue(&self) -> bool {
        match self.headers().get(EXPECT) {
            Some(value) => value.as_bytes().len() >= 4 && &value.as_bytes()[..4] == b"100-",
            None => false,
        }
    }
}

/// Checks whether any `Connection` header value carries the given token.
///
/// The header is a comma-separated token list and may appear multiple times;
/// token comparison is case-insensitive.
pub(crate) fn has_connection_token(headers: &HeaderMap, token: &str) -> bool {
    headers.get_all(CONNECTION).iter().any(|value| {
        value
            .to_str()
            .map(|list| list.split(',').any(|item| item.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    })
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn request(version: Version, connection: Option<&str>) -> RequestHeader {
        let mut builder = Request::builder().method(Method::GET).uri("/").version(version);
        if let Some(value) = connection {
            builder = builder.header(CONNECTION, value);
        }
        RequestHeader::from(builder.body(()).unwrap())
    }

    #[test]
    fn http11_defaults_to_keep_alive() {
        assert!(request(Version::HTTP_11, None).keep_alive());
        assert!(request(Version::HTTP_11, Some("keep-alive")).keep_alive());
    }

    #[test]
    fn http11_close_disables_keep_alive() {
        assert!(!request(Version::HTTP_11, Some("close")).keep_alive());
        assert!(!request(Version::HTTP_11, Some("Close")).keep_alive());
        assert!(!request(Version::HTTP_11, Some("upgrade, close")).keep_alive());
    }

    #[test]
    fn http10_requires_explicit_keep_alive() {
        assert!(!request(Version::HTTP_10, None).keep_alive());
        assert!(request(Version::HTTP_10, Some("keep-alive")).keep_alive());
        assert!(request(Version::HTTP_10, Some("Keep-Alive")).keep_alive());
    }

    #[test]
    fn expects_continue_matches_prefix() {
        let mut header = request(Version::HTTP_11, None);
        assert!(!header.expects_continue());

        header.inner.headers_mut().insert(EXPECT, HeaderValue::from_static("100-continue"));
        assert!(header.expects_continue());
    }

    #[test]
    fn connection_token_scan_handles_lists() {
        let mut headers = HeaderMap::new();
        headers.append(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.append(CONNECTION, HeaderValue::from_static("keep-alive, close"));
        assert!(has_connection_token(&headers, "close"));
        assert!(has_connection_token(&headers, "keep-alive"));
        assert!(has_connection_token(&headers, "upgrade"));
        assert!(!has_connection_token(&headers, "te"));
    }
}
