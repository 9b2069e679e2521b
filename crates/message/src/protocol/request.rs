//! Client requests.
//!
//! [`Request`] adds a method and a [`Uri`] to the common message parts.
//! [`HttpRequest`] carries the request accessors and mutators so that
//! [`ServerRequest`](super::ServerRequest) shares them.
//!
//! A request without an explicit `Host` header derives one from its URI, on
//! construction and on every URI replacement unless host preservation is
//! requested.

use tracing::trace;

use super::message::{Editor, HttpMessage, MessageParts};
use super::{HeaderMap, MessageError, Result, Uri};
use crate::codec::{RawMessage, parse_message};
use crate::stream::Body;
use crate::utils::ensure;

/// An HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    parts: MessageParts,
    method: String,
    uri: Uri,
}

impl Request {
    pub fn new(method: &str, uri: Uri) -> Self {
        Self::from_parts(method, uri, HeaderMap::new(), Body::empty())
    }

    pub fn from_parts(method: &str, uri: Uri, headers: HeaderMap, body: Body) -> Self {
        let mut request = Self { parts: MessageParts::new(headers, body), method: method.to_string(), uri };
        if !request.parts.headers.contains("host") {
            request.update_host_from_uri();
        }
        request
    }

    /// Parses a request from its wire form.
    ///
    /// The URI is made absolute with the `Host` header when one is present;
    /// the scheme is `https` only when that host ends in `:443`.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        Self::from_raw(parse_message(buffer)?)
    }

    pub(crate) fn from_raw(raw: RawMessage) -> Result<Self> {
        let RawMessage { start_line, headers, body } = raw;

        let tokens: Vec<&str> = start_line.split_whitespace().collect();
        let &[method, target, protocol] = tokens.as_slice() else {
            return Err(MessageError::malformed(format!("request line must have 3 parts: {start_line:?}")));
        };
        let version = protocol
            .strip_prefix("HTTP/")
            .ok_or_else(|| MessageError::malformed(format!("invalid protocol label: {protocol:?}")))?;

        let host = headers.get_line("host");
        let uri = if host.is_empty() || !target.starts_with('/') {
            Uri::parse(target)?
        } else {
            let scheme = if host.ends_with(":443") { "https" } else { "http" };
            Uri::parse(&format!("{scheme}://{host}{target}"))?
        };
        trace!(method, target, version, "parsed request line");

        let mut editor = Request::from_parts(method, uri, headers, Body::from(body)).edit();
        editor.set_protocol_version(version).map_err(|e| MessageError::malformed(e.to_string()))?;
        Ok(editor.finish())
    }

    pub(crate) fn replace_uri(&mut self, uri: Uri, preserve_host: bool) {
        self.uri = uri;
        if !preserve_host || !self.parts.headers.contains("host") {
            self.update_host_from_uri();
        }
    }

    fn update_host_from_uri(&mut self) {
        if let Some(host) = self.uri.host_header() {
            self.parts.headers.set_unchecked("host", vec![host]);
        }
    }
}

impl HttpMessage for Request {
    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }

    fn start_line(&self) -> String {
        format!("{} {} HTTP/{}", self.method, self.uri.request_target(), self.parts.version)
    }
}

/// Accessors and mutators shared by every request type.
pub trait HttpRequest: HttpMessage {
    fn request(&self) -> &Request;

    fn request_mut(&mut self) -> &mut Request;

    /// Called after the URI was replaced, so derived state can be rebuilt.
    fn uri_replaced(&mut self) {}

    /// The method, upper-cased.
    fn method(&self) -> String {
        self.request().method.to_ascii_uppercase()
    }

    /// The method exactly as declared on the request line.
    fn original_method(&self) -> &str {
        &self.request().method
    }

    fn uri(&self) -> &Uri {
        &self.request().uri
    }

    /// `path[?query][#fragment]` of the URI.
    fn request_target(&self) -> String {
        self.uri().request_target()
    }

    fn is_method(&self, method: &str) -> bool {
        self.method().eq_ignore_ascii_case(method)
    }

    fn is_get(&self) -> bool {
        self.is_method("GET")
    }

    fn is_post(&self) -> bool {
        self.is_method("POST")
    }

    fn is_put(&self) -> bool {
        self.is_method("PUT")
    }

    fn is_patch(&self) -> bool {
        self.is_method("PATCH")
    }

    fn is_delete(&self) -> bool {
        self.is_method("DELETE")
    }

    fn is_head(&self) -> bool {
        self.is_method("HEAD")
    }

    fn is_options(&self) -> bool {
        self.is_method("OPTIONS")
    }

    /// Whether the request was sent by a script (`X-Requested-With: XMLHttpRequest`).
    fn is_ajax(&self) -> bool {
        self.header_line("x-requested-with").eq_ignore_ascii_case("xmlhttprequest")
    }

    fn with_method(&self, method: &str) -> Self {
        let mut editor = self.clone().edit();
        editor.set_method(method);
        editor.finish()
    }

    /// Replaces the URI; the `Host` header follows it unless `preserve_host`
    /// is set and a `Host` header already exists.
    fn with_uri(&self, uri: Uri, preserve_host: bool) -> Self {
        let mut editor = self.clone().edit();
        editor.set_uri(uri, preserve_host);
        editor.finish()
    }

    /// Replaces path, query and fragment from a `path?query#fragment` string, keeping the host.
    fn with_request_target(&self, target: &str) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.set_request_target(target)?;
        Ok(editor.finish())
    }
}

impl HttpRequest for Request {
    fn request(&self) -> &Request {
        self
    }

    fn request_mut(&mut self) -> &mut Request {
        self
    }
}

impl<M: HttpRequest> Editor<M> {
    pub fn set_method(&mut self, method: &str) -> &mut Self {
        self.message.request_mut().method = method.to_string();
        self
    }

    pub fn set_uri(&mut self, uri: Uri, preserve_host: bool) -> &mut Self {
        self.message.request_mut().replace_uri(uri, preserve_host);
        self.message.uri_replaced();
        self
    }

    pub fn set_request_target(&mut self, target: &str) -> Result<&mut Self> {
        ensure!(!target.is_empty(), MessageError::invalid_argument("request target must not be empty"));
        let parsed = Uri::parse(target)
            .map_err(|e| MessageError::invalid_argument(format!("invalid request target {target:?}: {e}")))?;

        let mut uri = self.message.uri().clone();
        uri.set_path(&parsed.path());
        uri.set_query(parsed.query());
        uri.set_fragment(parsed.fragment());
        Ok(self.set_uri(uri, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use indoc::indoc;

    #[test]
    fn test_parse_request() {
        let str = indoc! {r##"
        GET /Test?key=value#hello HTTP/1.1
        Host: www.example.com
        Accept: */*

        "##};

        let request = Request::parse(str.as_bytes()).unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.protocol_version(), "1.1");
        assert_eq!(request.uri().to_string(), "http://www.example.com/Test?key=value#hello");
        assert_eq!(request.request_target(), "/Test?key=value#hello");
        assert_eq!(request.header_line("host"), "www.example.com");
    }

    #[test]
    fn test_parse_https_host() {
        let request = Request::parse(b"GET / HTTP/1.0\r\nHost: secure.example.com:443\r\n\r\n").unwrap();
        assert_eq!(request.uri().scheme(), "https");
        assert_eq!(request.uri().host(), "secure.example.com");
        assert_eq!(request.protocol_version(), "1.0");
    }

    #[test]
    fn test_parse_bad_request_line() {
        assert!(matches!(Request::parse(b"GET /\r\n\r\n"), Err(MessageError::Malformed { .. })));
        assert!(matches!(Request::parse(b"GET / HTTP/1.1 extra\r\n\r\n"), Err(MessageError::Malformed { .. })));
        assert!(matches!(Request::parse(b"GET / SPDY/3\r\n\r\n"), Err(MessageError::Malformed { .. })));
    }

    #[test]
    fn test_host_derived_from_uri() {
        let request = Request::new("get", Uri::parse("http://example.com:8080/a").unwrap());
        assert_eq!(request.header_line("Host"), "example.com:8080");
        assert_eq!(request.method(), "GET");
        assert_eq!(request.original_method(), "get");

        let moved = request.with_uri(Uri::parse("http://other.org/b").unwrap(), false);
        assert_eq!(moved.header_line("host"), "other.org");

        let preserved = request.with_uri(Uri::parse("http://other.org/b").unwrap(), true);
        assert_eq!(preserved.header_line("host"), "example.com:8080");
        assert_eq!(preserved.uri().host(), "other.org");
    }

    #[test]
    fn test_explicit_host_kept_on_construction() {
        let mut headers = HeaderMap::new();
        headers.set("Host", "proxy.local").unwrap();
        let request = Request::from_parts("GET", Uri::parse("http://example.com/").unwrap(), headers, Body::empty());
        assert_eq!(request.header_line("host"), "proxy.local");
    }

    #[test]
    fn test_with_request_target() {
        let request = Request::parse(b"GET /Test?key=value#hello HTTP/1.1\r\nHost: www.example.com\r\n\r\n").unwrap();

        let changed = request.with_request_target("/other?page=2").unwrap();
        assert_eq!(changed.request_target(), "/other?page=2");
        assert_eq!(changed.uri().host(), "www.example.com");
        assert_eq!(request.request_target(), "/Test?key=value#hello");

        assert!(matches!(request.with_request_target(""), Err(MessageError::InvalidArgument { .. })));
        assert!(matches!(request.with_request_target("/a b"), Err(MessageError::InvalidArgument { .. })));
    }

    #[test]
    fn test_method_helpers() {
        let request = Request::new("post", Uri::default())
            .with_header("X-Requested-With", "XMLHttpRequest")
            .unwrap();
        assert!(request.is_post());
        assert!(request.is_method("POST"));
        assert!(!request.is_get());
        assert!(request.is_ajax());
        assert!(request.with_method("DELETE").is_delete());
    }

    #[test]
    fn test_round_trip() {
        let request = Request::new("PUT", Uri::parse("http://example.com/items/7?draft=1#top").unwrap())
            .with_header("Content-Type", "application/json")
            .unwrap()
            .with_added_header("Accept", vec!["text/html", "application/json"])
            .unwrap()
            .with_body(r#"{"name":"seven"}"#);

        let wire = request.to_bytes().unwrap();
        let parsed = Request::parse(&wire).unwrap();

        assert_eq!(parsed.method(), "PUT");
        assert_eq!(parsed.uri().path(), "/items/7");
        assert_eq!(parsed.uri().query(), "draft=1");
        assert_eq!(parsed.uri().fragment(), "top");
        for (name, _) in request.headers() {
            assert_eq!(parsed.header_line(name), request.header_line(name));
        }
        assert_eq!(parsed.headers().len(), request.headers().len());
        assert_eq!(parsed.body().to_bytes().unwrap(), Bytes::from_static(br#"{"name":"seven"}"#));
    }
}
