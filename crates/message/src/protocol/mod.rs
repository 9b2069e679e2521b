//! HTTP message value types.
//!
//! # Architecture
//!
//! - **Messages** ([`message`]): [`MessageParts`] holds the protocol version,
//!   headers and body shared by every message; [`HttpMessage`] reads them and
//!   produces modified copies; [`Editor`] mutates an owned message in place.
//! - **Requests** ([`Request`], [`HttpRequest`]): method and [`Uri`], with the
//!   `Host` header following the URI.
//! - **Server requests** ([`ServerRequest`]): query, cookie and body
//!   parameters, uploaded files, server parameters and attributes.
//! - **Responses** ([`Response`]): status, reason phrase and a [`CookieJar`]
//!   serialized as `Set-Cookie` lines.
//! - **Errors** ([`error`]): [`MessageError`] covers every failure of the crate.
//!
//! Every `with_*` method takes `&self` and returns a new value; the receiver
//! is never changed. Bodies are shared handles, so a copied message reads
//! and writes the same stream as its original.

mod cookie;
pub use cookie::{Cookie, CookieJar, Expires};

pub mod error;
pub use error::{Capability, MessageError, Result};

mod header;
pub use header::{HeaderMap, IntoHeaderValues, canonical_name};

pub mod message;
pub use message::{DEFAULT_PROTOCOL_VERSION, Editor, HttpMessage, MessageParts};

mod request;
pub use request::{HttpRequest, Request};

mod response;
pub use response::{DEFAULT_REDIRECT_STATUS, Response};

mod server_request;
pub use server_request::{METHOD_OVERRIDE_FIELD, METHOD_OVERRIDE_HEADER, ServerParams, ServerRequest};

mod uri;
pub use uri::Uri;
