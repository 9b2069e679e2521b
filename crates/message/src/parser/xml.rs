//! XML body decoding.
//!
//! The document element becomes the parsed body. Elements holding only text
//! become strings; elements with children or attributes become maps, with
//! attributes collected under `@attributes` and repeated child names turned
//! into lists. Document type declarations are skipped and entity references
//! other than the predefined XML ones are rejected, so no external entity is
//! ever resolved.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::Value;
use tracing::debug;

use super::{BodyDecoder, DecodeContext, Decoded, ParsedBody, Params};
use crate::protocol::{MessageError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDecoder;

impl BodyDecoder for XmlDecoder {
    fn decode(&self, body: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
        let root = parse_document(body).map_err(|reason| MessageError::decode(ctx.media_type, reason))?;
        Ok(Decoded::body(root.map_or(ParsedBody::Absent, ParsedBody::from_value)))
    }
}

/// An element whose end tag has not been read yet.
#[derive(Debug)]
struct Element {
    name: String,
    attributes: Params,
    children: Params,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Params::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            attributes.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self { name, attributes, children: Params::new(), text: String::new() })
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() && self.attributes.is_empty() {
            return Value::String(self.text);
        }

        let mut map = Params::new();
        if !self.attributes.is_empty() {
            map.insert("@attributes".to_string(), Value::Object(self.attributes));
        }
        map.extend(self.children);
        if !self.text.is_empty() {
            map.insert("#text".to_string(), Value::String(self.text));
        }
        Value::Object(map)
    }
}

fn parse_document(body: &[u8]) -> Result<Option<Value>, String> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                close(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack.pop().ok_or("unexpected end tag")?;
                close(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                if let Some(element) = stack.last_mut() {
                    element.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(element) = stack.last_mut() {
                    element.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::DocType(_) => debug!("skip xml document type declaration"),
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(element) = stack.last() {
        return Err(format!("unclosed element <{}>", element.name));
    }
    Ok(root)
}

fn close(stack: &mut [Element], root: &mut Option<Value>, element: Element) {
    let name = element.name.clone();
    let value = element.into_value();
    let Some(parent) = stack.last_mut() else {
        *root = Some(value);
        return;
    };

    match parent.children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.children.insert(name, value);
        }
    }
}
