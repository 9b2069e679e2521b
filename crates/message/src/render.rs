//! Writing values into message bodies.
//!
//! A [`Renderer`] turns a value into body bytes and names the matching media
//! type; [`render_into`] applies both to a message. [`FileRenderer`] attaches
//! a file from disk instead of a rendered value.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use mime::Mime;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::protocol::{HttpMessage, MessageError, Result};
use crate::stream::Stream;
use crate::utils::ensure;

const XML_ROOT: &str = "xml";

/// Element name for array items, wrapped scalars and keys that are not element names.
const XML_ITEM: &str = "item";

/// Serializes a value for a message body.
pub trait Renderer {
    fn content_type(&self) -> Mime;

    fn render(&self, value: &Value) -> Result<Bytes>;
}

/// `application/json`, compact unless `pretty` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer {
    pub pretty: bool,
}

impl Renderer for JsonRenderer {
    fn content_type(&self) -> Mime {
        mime::APPLICATION_JSON
    }

    fn render(&self, value: &Value) -> Result<Bytes> {
        let bytes = if self.pretty { serde_json::to_vec_pretty(value) } else { serde_json::to_vec(value) };
        bytes.map(Bytes::from).map_err(|e| MessageError::invalid_argument(format!("value is not serializable: {e}")))
    }
}

/// JSON wrapped in a call to `callback`.
#[derive(Debug, Clone)]
pub struct JsonpRenderer {
    callback: String,
}

impl JsonpRenderer {
    /// Fails unless `callback` is a dotted JavaScript identifier.
    pub fn new(callback: &str) -> Result<Self> {
        ensure!(is_callback_name(callback), MessageError::invalid_argument(format!("invalid jsonp callback: {callback:?}")));
        Ok(Self { callback: callback.to_string() })
    }

    pub fn callback(&self) -> &str {
        &self.callback
    }
}

impl Renderer for JsonpRenderer {
    fn content_type(&self) -> Mime {
        mime::APPLICATION_JAVASCRIPT_UTF_8
    }

    fn render(&self, value: &Value) -> Result<Bytes> {
        let json = JsonRenderer::default().render(value)?;
        let mut out = Vec::with_capacity(json.len() + self.callback.len() + 3);
        out.extend_from_slice(self.callback.as_bytes());
        out.push(b'(');
        out.extend_from_slice(&json);
        out.extend_from_slice(b");");
        Ok(Bytes::from(out))
    }
}

/// `text/plain`: strings verbatim, other values as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn content_type(&self) -> Mime {
        mime::TEXT_PLAIN_UTF_8
    }

    fn render(&self, value: &Value) -> Result<Bytes> {
        Ok(Bytes::from(plain_text(value)))
    }
}

/// `text/html`: strings are taken as markup, other values are escaped into a `<pre>` block.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn content_type(&self) -> Mime {
        mime::TEXT_HTML_UTF_8
    }

    fn render(&self, value: &Value) -> Result<Bytes> {
        let html = match value {
            Value::String(markup) => markup.clone(),
            other => format!("<pre>{}</pre>", escape_html(&plain_text(other))),
        };
        Ok(Bytes::from(html))
    }
}

/// `text/xml`: the value becomes the children of an `<xml>` root element.
///
/// Object keys name child elements and nest recursively. Array items, and keys
/// that are not valid element names, become `<item>` elements. A scalar value
/// is wrapped in a single `<item>`; `null` renders as an empty element.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRenderer;

impl Renderer for XmlRenderer {
    fn content_type(&self) -> Mime {
        mime::TEXT_XML
    }

    fn render(&self, value: &Value) -> Result<Bytes> {
        let mut writer = Writer::new(Vec::new());
        write_document(&mut writer, value).map_err(|e| MessageError::invalid_argument(format!("cannot render xml: {e}")))?;
        Ok(Bytes::from(writer.into_inner()))
    }
}

/// Sends a file as an attachment.
///
/// The body streams the file from disk; `Content-Type` carries the configured
/// media type (`application/octet-stream` unless set) and
/// `Content-Disposition` the download name.
#[derive(Debug, Clone)]
pub struct FileRenderer {
    path: PathBuf,
    media_type: Mime,
    filename: String,
}

impl FileRenderer {
    /// Renders the file at `path`, offered under its own file name.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let filename = path.file_name().map_or_else(|| "download".to_string(), |name| name.to_string_lossy().into_owned());
        Self { path, media_type: mime::APPLICATION_OCTET_STREAM, filename }
    }

    pub fn with_media_type(mut self, media_type: Mime) -> Self {
        self.media_type = media_type;
        self
    }

    /// The name offered to the client for saving the file.
    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attaches the file to a copy of `message`.
    pub fn render_into<M: HttpMessage>(&self, message: &M) -> Result<M> {
        let mut stream = Stream::open(&self.path, "rb")?;
        trace!(path = %self.path.display(), size = ?stream.size(), "attach file body");

        let disposition = format!("attachment; filename=\"{}\"", self.filename.replace('\\', "\\\\").replace('"', "\\\""));
        let mut editor = message.clone().edit();
        editor.set_header("content-type", self.media_type.as_ref())?;
        editor.set_header("content-disposition", disposition)?;
        editor.set_header("content-transfer-encoding", "binary")?;
        editor.set_body(stream);
        Ok(editor.finish())
    }
}

/// Renders `value` into a copy of `message`, replacing its body and `Content-Type`.
pub fn render_into<M, R, T>(message: &M, renderer: &R, value: &T) -> Result<M>
where
    M: HttpMessage,
    R: Renderer + ?Sized,
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)
        .map_err(|e| MessageError::invalid_argument(format!("value is not serializable: {e}")))?;
    let body = renderer.render(&value)?;

    let mut editor = message.clone().edit();
    editor.set_header("content-type", renderer.content_type().as_ref())?;
    editor.set_body(body);
    Ok(editor.finish())
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn write_document(writer: &mut Writer<Vec<u8>>, value: &Value) -> io::Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(XML_ROOT)))?;
    match value {
        Value::Object(_) | Value::Array(_) => write_children(writer, value)?,
        scalar => write_element(writer, XML_ITEM, scalar)?,
    }
    writer.write_event(Event::End(BytesEnd::new(XML_ROOT)))
}

fn write_children(writer: &mut Writer<Vec<u8>>, value: &Value) -> io::Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if is_xml_name(key) { key.as_str() } else { XML_ITEM };
                write_element(writer, name, child)?;
            }
        }
        Value::Array(items) => {
            for child in items {
                write_element(writer, XML_ITEM, child)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> io::Result<()> {
    if value.is_null() {
        return writer.write_event(Event::Empty(BytesStart::new(name)));
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    match value {
        Value::Object(_) | Value::Array(_) => write_children(writer, value)?,
        scalar => writer.write_event(Event::Text(BytesText::new(&plain_text(scalar))))?,
    }
    writer.write_event(Event::End(BytesEnd::new(name)))
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn is_callback_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}
