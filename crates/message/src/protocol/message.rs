//! The message abstraction shared by requests and responses.
//!
//! # Architecture
//!
//! Every message type stores a [`MessageParts`] (protocol version, headers,
//! body) and implements [`HttpMessage`], which supplies the read accessors and
//! the copy-on-write `with_*` mutators. Each `with_*` call clones the message,
//! applies the change through an [`Editor`] and returns the new value, so the
//! receiver is never modified.
//!
//! [`Editor`] is the in-place path: it owns a message, mutates it through
//! `set_*` methods that return `&mut Self`, and hands it back with
//! [`Editor::finish`]. Type-specific setters (status, method, query
//! parameters...) live next to their message types.

use std::ops::Deref;

use bytes::{Bytes, BytesMut};

use super::header::{HeaderMap, IntoHeaderValues};
use super::{MessageError, Result};
use crate::codec::message_encoder;
use crate::stream::Body;
use crate::utils::ensure;

/// Protocol version assigned to messages that do not state one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.1";

/// The state common to every message.
#[derive(Debug, Clone)]
pub struct MessageParts {
    pub(crate) version: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
}

impl MessageParts {
    pub fn new(headers: HeaderMap, body: Body) -> Self {
        Self { version: DEFAULT_PROTOCOL_VERSION.to_string(), headers, body }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

impl Default for MessageParts {
    fn default() -> Self {
        Self::new(HeaderMap::new(), Body::empty())
    }
}

/// Read access and copy-on-write mutation for HTTP messages.
pub trait HttpMessage: Clone {
    fn parts(&self) -> &MessageParts;

    fn parts_mut(&mut self) -> &mut MessageParts;

    /// The request line or status line, without the trailing CRLF.
    fn start_line(&self) -> String;

    /// Writes the header block (one `Name: value` line per header) into `dst`.
    fn write_headers(&self, dst: &mut BytesMut) {
        message_encoder::write_headers(dst, self.headers());
    }

    /// Called after the header `name` changed through an [`Editor`].
    ///
    /// `name` is passed as the caller wrote it, compare it case-insensitively.
    fn headers_replaced(&mut self, _name: &str) {}

    /// Called after the body was replaced, so derived state can be dropped.
    fn body_replaced(&mut self) {}

    fn protocol_version(&self) -> &str {
        &self.parts().version
    }

    fn headers(&self) -> &HeaderMap {
        &self.parts().headers
    }

    fn has_header(&self, name: &str) -> bool {
        self.parts().headers.contains(name)
    }

    /// All values of `name`, empty when absent.
    fn header(&self, name: &str) -> &[String] {
        self.parts().headers.get(name)
    }

    /// The values of `name` joined with commas.
    fn header_line(&self, name: &str) -> String {
        self.parts().headers.get_line(name)
    }

    fn body(&self) -> &Body {
        &self.parts().body
    }

    /// Starts an in-place edit of this message.
    fn edit(self) -> Editor<Self> {
        Editor::new(self)
    }

    fn with_protocol_version(&self, version: &str) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.set_protocol_version(version)?;
        Ok(editor.finish())
    }

    fn with_header<V: IntoHeaderValues>(&self, name: &str, values: V) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.set_header(name, values)?;
        Ok(editor.finish())
    }

    fn with_added_header<V: IntoHeaderValues>(&self, name: &str, values: V) -> Result<Self> {
        let mut editor = self.clone().edit();
        editor.append_header(name, values)?;
        Ok(editor.finish())
    }

    fn without_header(&self, name: &str) -> Self {
        let mut editor = self.clone().edit();
        editor.remove_header(name);
        editor.finish()
    }

    /// Merges `headers` into a copy, replacing the names it defines.
    fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut editor = self.clone().edit();
        editor.merge_headers(headers);
        editor.finish()
    }

    fn with_body<B: Into<Body>>(&self, body: B) -> Self {
        let mut editor = self.clone().edit();
        editor.set_body(body);
        editor.finish()
    }

    /// The start line followed by every header line.
    fn header_to_string(&self) -> String {
        let mut dst = BytesMut::new();
        message_encoder::encode_head(self, &mut dst);
        String::from_utf8_lossy(&dst).into_owned()
    }

    /// The full wire form: head, blank line, body.
    fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        message_encoder::encode(self, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// In-place mutation of an owned message.
///
/// Dereferences to the message so accessors remain available while editing.
#[derive(Debug)]
pub struct Editor<M> {
    pub(crate) message: M,
}

impl<M: HttpMessage> Editor<M> {
    pub fn new(message: M) -> Self {
        Self { message }
    }

    /// Sets the protocol version, `1.1` style.
    pub fn set_protocol_version(&mut self, version: &str) -> Result<&mut Self> {
        ensure!(is_protocol_version(version), MessageError::invalid_argument(format!("invalid protocol version: {version:?}")));
        self.message.parts_mut().version = version.to_string();
        Ok(self)
    }

    pub fn set_header<V: IntoHeaderValues>(&mut self, name: &str, values: V) -> Result<&mut Self> {
        self.message.parts_mut().headers.set(name, values)?;
        self.message.headers_replaced(name);
        Ok(self)
    }

    pub fn append_header<V: IntoHeaderValues>(&mut self, name: &str, values: V) -> Result<&mut Self> {
        self.message.parts_mut().headers.append(name, values)?;
        self.message.headers_replaced(name);
        Ok(self)
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.message.parts_mut().headers.remove(name);
        self.message.headers_replaced(name);
        self
    }

    pub fn merge_headers(&mut self, headers: HeaderMap) -> &mut Self {
        let names = headers.iter().map(|(name, _)| name.to_string()).collect::<Vec<_>>();
        self.message.parts_mut().headers.merge(headers);
        for name in &names {
            self.message.headers_replaced(name);
        }
        self
    }

    pub fn set_body<B: Into<Body>>(&mut self, body: B) -> &mut Self {
        self.message.parts_mut().body = body.into();
        self.message.body_replaced();
        self
    }

    pub fn finish(self) -> M {
        self.message
    }
}

impl<M> Deref for Editor<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.message
    }
}

fn is_protocol_version(version: &str) -> bool {
    let mut parts = version.splitn(2, '.');
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    parts.next().is_some_and(all_digits) && parts.next().is_none_or(all_digits)
}
