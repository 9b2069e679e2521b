//! HTTP message value objects
//!
//! This crate models HTTP/1.1 requests and responses as plain values: parsing
//! them from their wire form, deriving copies with changed parts and writing
//! them back out. Server-side requests additionally decode their bodies by
//! content type, including `multipart/form-data` uploads.
//!
//! # Features
//!
//! - Request, response and server-request messages with copy-on-write `with_*` methods
//! - An in-place [`Editor`](protocol::Editor) for building messages without copies
//! - Raw message parsing tolerant of bare `\n` line endings
//! - URI parsing and manipulation
//! - Seekable, read-only, write-only and size-bounded body streams
//! - Pluggable body decoders for JSON, XML, URL-encoded and multipart bodies
//! - Uploaded files that can be moved exactly once
//! - Response cookies serialized as `Set-Cookie` lines
//!
//! # Example
//!
//! ```
//! use micro_message::protocol::{HttpMessage, HttpRequest, ServerParams, ServerRequest};
//! use serde_json::json;
//!
//! let raw = "POST /items?page=2 HTTP/1.1\r\n\
//!            Host: example.com\r\n\
//!            Content-Type: application/json\r\n\
//!            \r\n\
//!            {\"_method\":\"PUT\",\"name\":\"lamp\"}";
//!
//! let request = ServerRequest::parse(raw.as_bytes(), ServerParams::new()).unwrap();
//! assert_eq!(request.method(), "PUT");
//! assert_eq!(request.original_method(), "POST");
//! assert_eq!(request.uri().to_string(), "http://example.com/items?page=2");
//! assert_eq!(request.query_params()["page"], json!("2"));
//! assert_eq!(request.body_param("name").unwrap(), Some(&json!("lamp")));
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: message types, URIs, cookies and errors
//! - [`codec`]: raw message parsing and serialization
//! - [`stream`]: message bodies and the byte sources behind them
//! - [`parser`]: content-type driven body decoding
//! - [`upload`]: uploaded files
//! - [`render`]: writing values into message bodies
//! - [`source`]: the transport-facing request source

mod utils;

pub mod codec;
pub mod parser;
pub mod protocol;
pub mod render;
pub mod source;
pub mod stream;
pub mod upload;
