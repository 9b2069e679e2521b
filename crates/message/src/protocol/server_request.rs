//! Server-side requests.
//!
//! A [`ServerRequest`] wraps a [`Request`] with the state an application
//! reads while handling it:
//!
//! - query parameters, derived from the URI query and re-derived whenever the
//!   URI is replaced
//! - cookie parameters, parsed from the `Cookie` header and re-parsed only when
//!   that header is edited
//! - the parsed body and uploaded files, decoded on first access through the
//!   [`BodyParsers`] registry and memoized until the body or the
//!   `Content-Type` header is replaced
//! - server parameters handed over by the transport, and an attribute bag
//!
//! # Method override
//!
//! [`HttpRequest::method`] reports the effective method: the
//! `X-Http-Method-Override` header when present, otherwise, for `POST` only,
//! the `_method` field of the parsed body. Other methods never trigger body
//! decoding.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::message::{Editor, HttpMessage, MessageParts};
use super::request::HttpRequest;
use super::{HeaderMap, MessageError, Request, Result, Uri};
use crate::codec::{RawMessage, message_encoder};
use crate::parser::{BodyDecoder, BodyParsers, Decoded, ParsedBody, Params, media_type, parse_params};
use crate::source::RequestSource;
use crate::stream::Body;
use crate::upload::UploadedFiles;

pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Environment values supplied by the transport, such as CGI variables.
pub type ServerParams = HashMap<String, String>;

type Attribute = Arc<dyn Any + Send + Sync>;

/// A request as seen by the server handling it.
#[derive(Clone)]
pub struct ServerRequest {
    request: Request,
    server_params: ServerParams,
    query_params: Params,
    cookie_params: Params,
    attributes: BTreeMap<String, Attribute>,
    parsed_override: Option<ParsedBody>,
    files_override: Option<UploadedFiles>,
    parsers: Arc<BodyParsers>,
    decoded: OnceCell<Decoded>,
}

impl ServerRequest {
    pub fn new(method: &str, uri: Uri) -> Self {
        Self::from_request(Request::new(method, uri), ServerParams::new())
    }

    pub fn from_parts(method: &str, uri: Uri, headers: HeaderMap, body: Body, server_params: ServerParams) -> Self {
        Self::from_request(Request::from_parts(method, uri, headers, body), server_params)
    }

    /// Wraps `request`, deriving query and cookie parameters from it.
    pub fn from_request(request: Request, server_params: ServerParams) -> Self {
        let query_params = query_params_of(request.uri());
        let cookie_params = cookie_params_of(&request.header_line("cookie"));
        Self {
            request,
            server_params,
            query_params,
            cookie_params,
            attributes: BTreeMap::new(),
            parsed_override: None,
            files_override: None,
            parsers: Arc::new(BodyParsers::default()),
            decoded: OnceCell::new(),
        }
    }

    /// Parses a request from its wire form.
    pub fn parse(buffer: &[u8], server_params: ServerParams) -> Result<Self> {
        Ok(Self::from_request(Request::parse(buffer)?, server_params))
    }

    /// Builds a request from whatever transport produced it.
    ///
    /// When neither the request target nor a `Host` header names a host, the
    /// URI is rebuilt from the server parameters.
    pub fn from_source<S: RequestSource + ?Sized>(source: &S) -> Result<Self> {
        let method = source.method();
        let target = source.request_target();
        let protocol = source.protocol();

        let mut headers = HeaderMap::new();
        for (name, value) in source.header_lines() {
            headers.append(&name, value.as_str())?;
        }

        let raw = RawMessage { start_line: format!("{method} {target} {protocol}"), headers, body: source.body() };
        let request = Request::from_raw(raw)?;
        let server_params = source.environment();

        if !request.uri().host().is_empty() || server_params.is_empty() {
            return Ok(Self::from_request(request, server_params));
        }

        let base = Uri::from_server_params(&server_params)?;
        trace!(host = base.host(), "derive request uri from server params");
        let mut editor = Self::from_request(request, server_params).edit();
        editor.set_uri(base, false);
        editor.set_request_target(&target)?;
        Ok(editor.finish())
    }

    pub fn server_params(&self) -> &ServerParams {
        &self.server_params
    }

    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    pub fn query_params(&self) -> &Params {
        &self.query_params
    }

    pub fn cookie_params(&self) -> &Params {
        &self.cookie_params
    }

    /// The attribute `name`, if set and of type `T`.
    pub fn attribute<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.attributes.get(name).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// The normalized media type of the `Content-Type` header.
    pub fn content_type(&self) -> Option<String> {
        media_type(&self.header_line("content-type"))
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_line("content-length").trim().parse().ok()
    }

    pub fn body_parsers(&self) -> &BodyParsers {
        &self.parsers
    }

    /// The parsed body, decoding it on first access.
    ///
    /// Empty bodies, bodies without a `Content-Type` and media types without a
    /// registered decoder yield [`ParsedBody::Absent`].
    pub fn parsed_body(&self) -> Result<&ParsedBody> {
        match &self.parsed_override {
            Some(parsed) => Ok(parsed),
            None => Ok(&self.decoded()?.body),
        }
    }

    /// The value under `key` of a mapping body.
    pub fn body_param(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.parsed_body()?.get(key))
    }

    pub fn uploaded_files(&self) -> Result<&UploadedFiles> {
        match &self.files_override {
            Some(files) => Ok(files),
            None => Ok(&self.decoded()?.files),
        }
    }

    /// Binds `decoder` to `media_type` and drops any memoized decode.
    pub fn register_body_parser<D: BodyDecoder + 'static>(&mut self, media_type: &str, decoder: D) {
        Arc::make_mut(&mut self.parsers).register(media_type, decoder);
        self.decoded = OnceCell::new();
    }

    pub fn with_body_parser<D: BodyDecoder + 'static>(&self, media_type: &str, decoder: D) -> Self {
        let mut request = self.clone();
        request.register_body_parser(media_type, decoder);
        request
    }

    pub fn with_query_params(&self, params: Params) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.set_query_params(params)?;
        Ok(editor.finish())
    }

    /// Merges `params` over the current query parameters.
    pub fn with_added_query_params(&self, params: Params) -> Result<Self> {
        let mut merged = self.query_params.clone();
        merged.extend(params);
        self.with_query_params(merged)
    }

    pub fn with_cookie_params(&self, params: Params) -> Self {
        let mut editor = self.clone().edit();
        editor.set_cookie_params(params);
        editor.finish()
    }

    pub fn with_attribute<T: Any + Send + Sync>(&self, name: &str, value: T) -> Self {
        let mut editor = self.clone().edit();
        editor.set_attribute(name, value);
        editor.finish()
    }

    pub fn without_attribute(&self, name: &str) -> Self {
        let mut editor = self.clone().edit();
        editor.remove_attribute(name);
        editor.finish()
    }

    pub fn with_parsed_body(&self, parsed: ParsedBody) -> Self {
        let mut editor = self.clone().edit();
        editor.set_parsed_body(parsed);
        editor.finish()
    }

    pub fn with_uploaded_files(&self, files: UploadedFiles) -> Self {
        let mut editor = self.clone().edit();
        editor.set_uploaded_files(files);
        editor.finish()
    }

    fn decoded(&self) -> Result<&Decoded> {
        self.decoded.get_or_try_init(|| {
            let content_type = self.header_line("content-type");
            if content_type.is_empty() {
                return Ok(Decoded::default());
            }
            let bytes = self.body().to_bytes()?;
            if bytes.is_empty() {
                return Ok(Decoded::default());
            }
            trace!(content_type = %content_type, body_size = bytes.len(), "decode request body");
            self.parsers.decode(&content_type, &bytes)
        })
    }

    fn body_method_override(&self) -> Option<String> {
        match self.parsed_body() {
            Ok(parsed) => parsed.get(METHOD_OVERRIDE_FIELD).and_then(Value::as_str).map(str::to_ascii_uppercase),
            Err(e) => {
                warn!(error = %e, "cannot read method override from request body");
                None
            }
        }
    }

    /// The cookie parameters as a `Cookie` header value, each pair form-encoded.
    fn cookie_line(&self) -> String {
        let mut pairs = Vec::with_capacity(self.cookie_params.len());
        for (name, value) in &self.cookie_params {
            match encode_cookie_pair(name, value) {
                Ok(pair) => pairs.push(pair),
                Err(e) => warn!(cookie = %name, error = %e, "skip unencodable cookie parameter"),
            }
        }
        pairs.join("; ")
    }
}

impl Default for ServerRequest {
    fn default() -> Self {
        Self::new("GET", Uri::default())
    }
}

impl fmt::Debug for ServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRequest")
            .field("request", &self.request)
            .field("server_params", &self.server_params)
            .field("query_params", &self.query_params)
            .field("cookie_params", &self.cookie_params)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("parsers", &self.parsers)
            .finish_non_exhaustive()
    }
}

impl HttpMessage for ServerRequest {
    fn parts(&self) -> &MessageParts {
        self.request.parts()
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        self.request.parts_mut()
    }

    fn start_line(&self) -> String {
        self.request.start_line()
    }

    /// Writes the headers with `Cookie` rebuilt from the cookie parameters.
    fn write_headers(&self, dst: &mut BytesMut) {
        let cookie = self.cookie_line();
        let mut cookie_written = false;
        for (name, values) in self.headers() {
            if name == "cookie" {
                if !cookie.is_empty() {
                    message_encoder::write_header(dst, name, &cookie);
                }
                cookie_written = true;
                continue;
            }
            message_encoder::write_header(dst, name, &values.join(","));
        }
        if !cookie_written && !cookie.is_empty() {
            message_encoder::write_header(dst, "cookie", &cookie);
        }
    }

    fn headers_replaced(&mut self, name: &str) {
        if name.eq_ignore_ascii_case("cookie") {
            self.cookie_params = cookie_params_of(&self.header_line("cookie"));
        } else if name.eq_ignore_ascii_case("content-type") {
            self.decoded = OnceCell::new();
        }
    }

    fn body_replaced(&mut self) {
        self.decoded = OnceCell::new();
        self.parsed_override = None;
        self.files_override = None;
    }
}

impl HttpRequest for ServerRequest {
    fn request(&self) -> &Request {
        &self.request
    }

    fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    fn uri_replaced(&mut self) {
        self.query_params = query_params_of(self.request.uri());
    }

    fn method(&self) -> String {
        let header = self.header_line(METHOD_OVERRIDE_HEADER);
        if !header.trim().is_empty() {
            return header.trim().to_ascii_uppercase();
        }

        let declared = self.original_method().to_ascii_uppercase();
        if declared == "POST" {
            if let Some(method) = self.body_method_override() {
                return method;
            }
        }
        declared
    }
}

impl Editor<ServerRequest> {
    /// Replaces the query parameters and rewrites the URI query to match.
    pub fn set_query_params(&mut self, params: Params) -> Result<&mut Self> {
        let uri = self.message.uri().with_query_params(&params)?;
        self.message.request.replace_uri(uri, true);
        self.message.query_params = params;
        Ok(self)
    }

    pub fn set_cookie_params(&mut self, params: Params) -> &mut Self {
        self.message.cookie_params = params;
        self
    }

    pub fn set_server_params(&mut self, params: ServerParams) -> &mut Self {
        self.message.server_params = params;
        self
    }

    pub fn set_attribute<T: Any + Send + Sync>(&mut self, name: &str, value: T) -> &mut Self {
        self.message.attributes.insert(name.to_string(), Arc::new(value));
        self
    }

    pub fn remove_attribute(&mut self, name: &str) -> &mut Self {
        self.message.attributes.remove(name);
        self
    }

    pub fn set_parsed_body(&mut self, parsed: ParsedBody) -> &mut Self {
        self.message.parsed_override = Some(parsed);
        self
    }

    pub fn set_uploaded_files(&mut self, files: UploadedFiles) -> &mut Self {
        self.message.files_override = Some(files);
        self
    }
}

fn query_params_of(uri: &Uri) -> Params {
    parse_params(uri.query().as_bytes()).unwrap_or_else(|e| {
        debug!(query = uri.query(), error = %e, "ignore undecodable query");
        Params::new()
    })
}

/// Nested values expand to one `name[key]=value` pair each.
fn encode_cookie_pair(name: &str, value: &Value) -> Result<String> {
    let text = match value {
        Value::Array(_) | Value::Object(_) => {
            let mut single = Params::new();
            single.insert(name.to_string(), value.clone());
            return serde_qs::to_string(&single)
                .map(|query| query.replace('&', "; "))
                .map_err(MessageError::invalid_argument);
        }
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    serde_urlencoded::to_string(vec![(name, text.as_str())]).map_err(MessageError::invalid_argument)
}

/// Parses a `Cookie` header line (`a=1; b=2`).
fn cookie_params_of(line: &str) -> Params {
    if line.trim().is_empty() {
        return Params::new();
    }
    let pairs = line.split(';').map(str::trim).filter(|pair| !pair.is_empty()).collect::<Vec<_>>().join("&");
    parse_params(pairs.as_bytes()).unwrap_or_else(|e| {
        debug!(cookie = line, error = %e, "ignore undecodable cookie header");
        Params::new()
    })
}
