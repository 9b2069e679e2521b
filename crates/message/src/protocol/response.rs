//! Server responses.
//!
//! [`Response`] adds a status code, an optional reason phrase and a
//! [`CookieJar`] to the common message parts. `Set-Cookie` headers never stay
//! in the header map: they are moved into the jar whenever headers are set
//! and written back out, one line per cookie, when the response is
//! serialized.

use bytes::BytesMut;
use http::StatusCode;
use tracing::trace;

use super::cookie::{Cookie, CookieJar};
use super::message::{Editor, HttpMessage, MessageParts};
use super::{HeaderMap, MessageError, Result};
use crate::codec::{message_encoder, parse_message};
use crate::stream::Body;
use crate::utils::ensure;

/// Status used by [`Response::redirect`].
pub const DEFAULT_REDIRECT_STATUS: u16 = 303;

const SET_COOKIE: &str = "set-cookie";

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    parts: MessageParts,
    status: u16,
    reason: String,
    cookies: CookieJar,
}

impl Response {
    /// A response with `status`, no headers and an empty body.
    pub fn new(status: u16) -> Result<Self> {
        Self::from_parts(status, HeaderMap::new(), Body::empty(), "")
    }

    /// Builds a response; `Set-Cookie` headers are moved into the cookie jar.
    pub fn from_parts(status: u16, headers: HeaderMap, body: Body, reason: &str) -> Result<Self> {
        validate_status(status)?;
        let mut response =
            Self { parts: MessageParts::new(headers, body), status, reason: reason.to_string(), cookies: CookieJar::new() };
        response.extract_cookies();
        Ok(response)
    }

    /// Parses a response from its wire form, `HTTP/1.1 200 OK` status line first.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let raw = parse_message(buffer)?;

        let mut tokens = raw.start_line.splitn(3, ' ');
        let protocol = tokens.next().unwrap_or_default();
        let version = protocol
            .strip_prefix("HTTP/")
            .ok_or_else(|| MessageError::malformed(format!("invalid protocol label: {protocol:?}")))?;
        let status = tokens
            .next()
            .and_then(|code| code.trim().parse::<u16>().ok())
            .ok_or_else(|| MessageError::malformed(format!("invalid status line: {:?}", raw.start_line)))?;
        let reason = tokens.next().unwrap_or_default().trim();
        trace!(version, status, reason, "parsed status line");

        let response = Self::from_parts(status, raw.headers, Body::from(raw.body), reason)
            .map_err(|e| MessageError::malformed(e.to_string()))?;
        let mut editor = response.edit();
        editor.set_protocol_version(version).map_err(|e| MessageError::malformed(e.to_string()))?;
        Ok(editor.finish())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// The explicit reason phrase, or the standard phrase of the status code.
    pub fn reason_phrase(&self) -> &str {
        if self.reason.is_empty() {
            StatusCode::from_u16(self.status).ok().and_then(|code| code.canonical_reason()).unwrap_or_default()
        } else {
            &self.reason
        }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// The cookie stored for `name` under `domain` and `path`.
    pub fn cookie(&self, name: &str, domain: &str, path: &str) -> Option<&Cookie> {
        self.cookies.get(name, domain, path)
    }

    /// Sets the status; an empty `reason` falls back to the standard phrase.
    pub fn with_status(&self, status: u16, reason: &str) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.set_status(status, reason)?;
        Ok(editor.finish())
    }

    pub fn with_cookie(&self, cookie: Cookie) -> Self {
        let mut editor = self.clone().edit();
        editor.set_cookie(cookie);
        editor.finish()
    }

    /// A `303 See Other` pointing at `url`.
    pub fn redirect(&self, url: &str) -> Result<Self> {
        self.redirect_with_status(url, DEFAULT_REDIRECT_STATUS)
    }

    pub fn redirect_with_status(&self, url: &str, status: u16) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.set_status(status, "")?.set_header("Location", url)?;
        Ok(editor.finish())
    }

    /// 204, 205 and 304 carry no content.
    pub fn is_empty(&self) -> bool {
        matches!(self.status, 204 | 205 | 304)
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 301, 302, 303 and 307.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307)
    }

    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    fn extract_cookies(&mut self) {
        let Some(values) = self.parts.headers.remove(SET_COOKIE) else {
            return;
        };
        for value in values {
            match Cookie::parse(&value) {
                Some(cookie) => self.cookies.insert(cookie),
                None => trace!(value = %value, "skip set-cookie header without a name"),
            }
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self { parts: MessageParts::default(), status: 200, reason: String::new(), cookies: CookieJar::new() }
    }
}

impl HttpMessage for Response {
    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }

    fn start_line(&self) -> String {
        format!("HTTP/{} {} {}", self.parts.version, self.status, self.reason_phrase()).trim_end().to_string()
    }

    fn write_headers(&self, dst: &mut BytesMut) {
        message_encoder::write_headers(dst, &self.parts.headers);
        for cookie in &self.cookies {
            message_encoder::write_header(dst, SET_COOKIE, &cookie.to_header_value());
        }
    }

    fn headers_replaced(&mut self, name: &str) {
        if name.eq_ignore_ascii_case(SET_COOKIE) {
            self.extract_cookies();
        }
    }
}

impl Editor<Response> {
    pub fn set_status(&mut self, status: u16, reason: &str) -> Result<&mut Self> {
        validate_status(status)?;
        self.message.status = status;
        self.message.reason = reason.to_string();
        Ok(self)
    }

    pub fn set_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.message.cookies.insert(cookie);
        self
    }

    pub fn remove_cookie(&mut self, name: &str, domain: &str, path: &str) -> &mut Self {
        self.message.cookies.remove(name, domain, path);
        self
    }
}

fn validate_status(status: u16) -> Result<()> {
    ensure!((100..=599).contains(&status), MessageError::invalid_argument(format!("invalid status code: {status}")));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Expires;
    use bytes::Bytes;
    use indoc::indoc;

    #[test]
    fn test_default_response() {
        let response = Response::default();
        assert_eq!(response.status(), 200);
        assert_eq!(response.reason_phrase(), "OK");
        assert_eq!(response.to_bytes().unwrap(), Bytes::from_static(b"HTTP/1.1 200 OK\r\n\r\n"));
    }

    #[test]
    fn test_default_reason_phrase() {
        assert_eq!(Response::new(404).unwrap().reason_phrase(), "Not Found");
        assert_eq!(Response::new(299).unwrap().reason_phrase(), "");
        assert_eq!(Response::new(299).unwrap().start_line(), "HTTP/1.1 299");

        let custom = Response::default().with_status(418, "Short And Stout").unwrap();
        assert_eq!(custom.reason_phrase(), "Short And Stout");
    }

    #[test]
    fn test_invalid_status() {
        assert!(matches!(Response::new(99), Err(MessageError::InvalidArgument { .. })));
        assert!(matches!(Response::default().with_status(600, ""), Err(MessageError::InvalidArgument { .. })));
    }

    #[test]
    fn test_parse_response() {
        let str = indoc! {r##"
        HTTP/1.1 200 OK
        Content-Type: text/html
        Set-Cookie: test=demo; path=/demo
        Set-Cookie: foo=bar; path=/test; domain=www.foobar.com; secure; httponly

        <html></html>"##};

        let response = Response::parse(str.as_bytes()).unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.reason_phrase(), "OK");
        assert!(!response.has_header("set-cookie"));
        assert_eq!(response.cookies().keys(), ["@/demo:test", "www.foobar.com@/test:foo"]);
        assert!(response.cookie("foo", "www.foobar.com", "/test").unwrap().is_secure());
        assert_eq!(response.body().to_bytes().unwrap(), Bytes::from_static(b"<html></html>"));

        let expected = concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: text/html\r\n",
            "Set-Cookie: test=demo; path=/demo\r\n",
            "Set-Cookie: foo=bar; path=/test; domain=www.foobar.com; secure; httponly\r\n",
        );
        assert_eq!(response.header_to_string(), expected);
    }

    #[test]
    fn test_parse_multi_word_reason() {
        let response = Response::parse(b"HTTP/1.0 503 Service Temporarily Unavailable\r\n\r\n").unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(response.reason_phrase(), "Service Temporarily Unavailable");
        assert_eq!(response.protocol_version(), "1.0");
        assert!(response.is_server_error());
    }

    #[test]
    fn test_parse_malformed_status_line() {
        assert!(matches!(Response::parse(b"HTTP/1.1 abc\r\n\r\n"), Err(MessageError::Malformed { .. })));
        assert!(matches!(Response::parse(b"HTTP/1.1 999 Nope\r\n\r\n"), Err(MessageError::Malformed { .. })));
        assert!(matches!(Response::parse(b"ICY 200 OK\r\n\r\n"), Err(MessageError::Malformed { .. })));
    }

    #[test]
    fn test_cookie_scoping() {
        let response = Response::default()
            .with_cookie(Cookie::new("name", "foo"))
            .with_cookie(Cookie::new("name", "bar"))
            .with_cookie(Cookie::new("name", "baz").with_path("/admin"));

        assert_eq!(response.cookies().len(), 2);
        assert_eq!(response.cookie("name", "", "/").unwrap().value(), "bar");
        assert_eq!(response.cookie("name", "", "/admin").unwrap().value(), "baz");
        assert!(response.cookie("name", "example.com", "/").is_none());
    }

    #[test]
    fn test_set_cookie_header_goes_to_jar() {
        let response = Response::default()
            .with_header("Set-Cookie", "id=7; expires=Fri, 23 Dec 2016 17:45:55 GMT")
            .unwrap();

        assert!(!response.has_header("set-cookie"));
        let cookie = response.cookie("id", "", "/").unwrap();
        assert_eq!(cookie.expires(), &Expires::from_timestamp(1_482_515_155));
        assert_eq!(
            response.header_to_string(),
            "HTTP/1.1 200 OK\r\nSet-Cookie: id=7; path=/; expires=Fri, 23 Dec 2016 17:45:55 GMT\r\n"
        );
    }

    #[test]
    fn test_redirect() {
        let response = Response::default().redirect("/login").unwrap();
        assert_eq!(response.status(), 303);
        assert_eq!(response.header_line("location"), "/login");
        assert!(response.is_redirect());

        let moved = Response::default().redirect_with_status("/new", 301).unwrap();
        assert_eq!(moved.reason_phrase(), "Moved Permanently");
    }

    #[test]
    fn test_status_predicates() {
        let status = |code| Response::new(code).unwrap();
        assert!(status(204).is_empty());
        assert!(status(304).is_empty());
        assert!(!status(200).is_empty());
        assert!(status(101).is_informational());
        assert!(status(201).is_successful());
        assert!(!status(308).is_redirect());
        assert!(status(308).is_redirection());
        assert!(status(403).is_forbidden());
        assert!(status(404).is_not_found());
        assert!(status(422).is_client_error());
        assert!(!status(422).is_server_error());
    }
}
