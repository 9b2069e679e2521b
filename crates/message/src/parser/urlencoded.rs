//! `application/x-www-form-urlencoded` decoding.
//!
//! Keys written as `a[b]` nest into maps and `a[]` appends to a list, so
//! `user[name]=x&tags[]=1&tags[]=2` decodes to
//! `{"user": {"name": "x"}, "tags": ["1", "2"]}`. The same decoding is used
//! for URI query strings, `Cookie` headers and multipart fields.
//!
//! Pairs are first split flat with `serde_urlencoded`. A repeated key keeps
//! its last value unless it ends in `[]`, keys with unbalanced brackets have
//! their `[` turned into `_`, and keys opening with `[` are dropped. The
//! cleaned pairs are re-encoded with literal brackets in the keys and nested
//! by `serde_qs` in non-strict mode.

use std::collections::HashMap;

use tracing::trace;

use super::{BodyDecoder, DecodeContext, Decoded, ParsedBody, Params};
use crate::protocol::{MessageError, Result};

/// Nesting deeper than this keeps the remaining brackets in the key.
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodedDecoder;

impl BodyDecoder for UrlEncodedDecoder {
    fn decode(&self, body: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
        let params = parse_params(body).map_err(|e| MessageError::decode(ctx.media_type, e))?;
        Ok(Decoded::body(ParsedBody::Map(params)))
    }
}

/// Decodes `key=value&...` pairs into a possibly nested parameter map.
pub fn parse_params(input: &[u8]) -> Result<Params, serde_qs::Error> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(input).map_err(|e| serde_qs::Error::Custom(e.to_string()))?;
    nest_pairs(pairs)
}

/// Nests already decoded `(key, value)` pairs.
pub(crate) fn nest_pairs(pairs: Vec<(String, String)>) -> Result<Params, serde_qs::Error> {
    let mut flat: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (key, value) in pairs {
        let Some(key) = normalize_key(&key) else {
            trace!(key = %key, "drop parameter without a name");
            continue;
        };
        if key.ends_with("[]") {
            flat.push((key, value));
            continue;
        }
        match positions.get(&key) {
            Some(&index) => flat[index].1 = value,
            None => {
                positions.insert(key.clone(), flat.len());
                flat.push((key, value));
            }
        }
    }

    let encoded = flat.iter().map(|(key, value)| encode_pair(key, value)).collect::<Result<Vec<_>, _>>()?.join("&");
    serde_qs::Config::new(MAX_DEPTH, false).deserialize_str(&encoded)
}

/// Form-encodes a pair, leaving the brackets of the key literal.
fn encode_pair(key: &str, value: &str) -> Result<String, serde_qs::Error> {
    let pair = serde_urlencoded::to_string(vec![(key, value)]).map_err(|e| serde_qs::Error::Custom(e.to_string()))?;
    let (key, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
    Ok(format!("{}={value}", key.replace("%5B", "[").replace("%5D", "]")))
}

/// `None` for keys without a usable name.
fn normalize_key(key: &str) -> Option<String> {
    if key.is_empty() || key.starts_with('[') {
        return None;
    }
    if is_nested_key(key) { Some(key.to_string()) } else { Some(key.replace('[', "_")) }
}

/// `a`, `a[b]`, `a[]`, `a[b][]` and so on, with no stray brackets.
fn is_nested_key(key: &str) -> bool {
    let Some(open) = key.find('[') else {
        return true;
    };
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return false;
        };
        if inner[..close].contains('[') {
            return false;
        }
        rest = &inner[close + 1..];
    }
    rest.is_empty()
}
