use serde_json::Value;

use super::{BodyDecoder, DecodeContext, Decoded, ParsedBody};
use crate::protocol::{MessageError, Result};

/// Decodes JSON bodies. A literal `null` is [`ParsedBody::Absent`]; invalid JSON is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl BodyDecoder for JsonDecoder {
    fn decode(&self, body: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
        let value: Value = serde_json::from_slice(body).map_err(|e| MessageError::decode(ctx.media_type, e))?;
        Ok(Decoded::body(ParsedBody::from_value(value)))
    }
}
