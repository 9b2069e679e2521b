//! Content-type driven body decoding.
//!
//! # Architecture
//!
//! [`BodyParsers`] maps a normalized media type (the part of `Content-Type`
//! before the first `;` or `,`, lower-cased) to a [`BodyDecoder`]. The default
//! registry knows:
//!
//! - `application/json`, `text/json`: [`JsonDecoder`]
//! - `application/xml`, `text/xml`: [`XmlDecoder`]
//! - `application/x-www-form-urlencoded`: [`UrlEncodedDecoder`]
//! - `multipart/form-data`: [`MultipartDecoder`]
//!
//! A decoder turns the raw body into a [`Decoded`] value: a [`ParsedBody`]
//! (mapping, scalar or absent) plus any uploaded files. Media types without
//! a decoder are not an error, they decode to [`ParsedBody::Absent`].

mod json;
mod multipart;
mod urlencoded;
mod xml;

pub use json::JsonDecoder;
pub use multipart::{MultipartDecoder, parse_boundary};
pub use urlencoded::{UrlEncodedDecoder, parse_params};
pub use xml::XmlDecoder;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::protocol::Result;
use crate::upload::UploadedFiles;

/// A string-keyed parameter map; values may nest.
pub type Params = serde_json::Map<String, Value>;

/// The decoded form of a request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ParsedBody {
    /// No decoder ran, or the payload was a literal `null`.
    #[default]
    Absent,
    Map(Params),
    /// A non-object payload such as a JSON array or string.
    Scalar(Value),
}

impl ParsedBody {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => ParsedBody::Absent,
            Value::Object(map) => ParsedBody::Map(map),
            other => ParsedBody::Scalar(other),
        }
    }

    /// The value under `key` of a mapping body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    pub fn as_map(&self) -> Option<&Params> {
        match self {
            ParsedBody::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ParsedBody::Absent)
    }
}

/// The output of a [`BodyDecoder`].
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    pub body: ParsedBody,
    pub files: UploadedFiles,
}

impl Decoded {
    pub fn body(body: ParsedBody) -> Self {
        Self { body, files: UploadedFiles::new() }
    }
}

/// What a decoder knows about the message it decodes.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    /// The normalized media type that selected the decoder.
    pub media_type: &'a str,
    /// The full `Content-Type` header line, parameters included.
    pub content_type: &'a str,
}

/// Turns raw body bytes into a [`Decoded`] value.
pub trait BodyDecoder: Send + Sync {
    fn decode(&self, body: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded>;
}

impl<F> BodyDecoder for F
where
    F: Fn(&[u8], &DecodeContext<'_>) -> Result<Decoded> + Send + Sync,
{
    fn decode(&self, body: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
        self(body, ctx)
    }
}

/// Registry of body decoders keyed by media type.
#[derive(Clone)]
pub struct BodyParsers {
    decoders: HashMap<String, Arc<dyn BodyDecoder>>,
}

impl BodyParsers {
    /// A registry without any decoder.
    pub fn empty() -> Self {
        Self { decoders: HashMap::new() }
    }

    /// Binds `media_type` to `decoder`, replacing a previous binding.
    pub fn register<D: BodyDecoder + 'static>(&mut self, media_type: &str, decoder: D) {
        self.decoders.insert(media_type.trim().to_ascii_lowercase(), Arc::new(decoder));
    }

    pub fn unregister(&mut self, media_type: &str) -> bool {
        self.decoders.remove(&media_type.trim().to_ascii_lowercase()).is_some()
    }

    pub fn get(&self, media_type: &str) -> Option<&dyn BodyDecoder> {
        self.decoders.get(media_type).map(|decoder| decoder.as_ref())
    }

    pub fn contains(&self, media_type: &str) -> bool {
        self.decoders.contains_key(media_type)
    }

    /// Decodes `body` with the decoder negotiated from `content_type`.
    pub fn decode(&self, content_type: &str, body: &[u8]) -> Result<Decoded> {
        let Some(media_type) = media_type(content_type) else {
            return Ok(Decoded::default());
        };
        let Some(decoder) = self.get(&media_type) else {
            debug!(media_type = %media_type, "no body decoder registered");
            return Ok(Decoded::default());
        };
        debug!(media_type = %media_type, body_size = body.len(), "decoding body");
        decoder.decode(body, &DecodeContext { media_type: &media_type, content_type })
    }
}

impl Default for BodyParsers {
    fn default() -> Self {
        let mut parsers = Self::empty();
        parsers.register("application/json", JsonDecoder);
        parsers.register("text/json", JsonDecoder);
        parsers.register("application/xml", XmlDecoder);
        parsers.register("text/xml", XmlDecoder);
        parsers.register("application/x-www-form-urlencoded", UrlEncodedDecoder);
        parsers.register("multipart/form-data", MultipartDecoder);
        parsers
    }
}

impl fmt::Debug for BodyParsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut media_types: Vec<_> = self.decoders.keys().collect();
        media_types.sort();
        f.debug_struct("BodyParsers").field("media_types", &media_types).finish()
    }
}

/// The media type of a `Content-Type` value: text before the first `;` or `,`, lower-cased.
pub fn media_type(content_type: &str) -> Option<String> {
    let media_type = content_type.split([';', ',']).next().unwrap_or_default().trim().to_ascii_lowercase();
    if media_type.is_empty() { None } else { Some(media_type) }
}
