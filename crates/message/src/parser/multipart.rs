//! `multipart/form-data` decoding.
//!
//! The body is cut at every `--boundary` delimiter line. The terminal
//! `--boundary--` marker is located and stripped first, with or without a
//! trailing line break, so the last part ends where the marker begins. Each
//! part is split once at its first blank line into a header block and a body.
//!
//! A part whose `Content-Disposition` carries a `filename` becomes an
//! [`UploadedFile`] backed by an in-memory stream; a part with only a `name`
//! becomes a string parameter. Parts without a `Content-Disposition` name are
//! skipped. Field names ending in `[]` collect several values.

use tracing::{debug, trace};

use super::urlencoded::nest_pairs;
use super::{BodyDecoder, DecodeContext, Decoded, ParsedBody};
use crate::protocol::{MessageError, Result};
use crate::upload::{UploadError, UploadedEntry, UploadedFile, UploadedFiles};
use crate::utils::{find_bytes, rfind_bytes};

#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartDecoder;

impl BodyDecoder for MultipartDecoder {
    fn decode(&self, body: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
        let Some(boundary) = parse_boundary(ctx.content_type) else {
            debug!(content_type = ctx.content_type, "multipart body without boundary");
            return Ok(Decoded::default());
        };

        let mut fields = Vec::new();
        let mut files = UploadedFiles::new();

        let parts = split_parts(body, &boundary);
        trace!(boundary = %boundary, part_count = parts.len(), "split multipart body");

        for part in parts {
            let Some((headers, content)) = split_head(part) else {
                trace!("skip multipart part without header block");
                continue;
            };
            let Some(disposition) = Disposition::find(headers) else {
                trace!("skip multipart part without content-disposition name");
                continue;
            };

            match disposition.filename {
                Some(filename) => {
                    let mut file =
                        UploadedFile::from_stream(content.to_vec(), content.len() as u64, UploadError::Ok)
                            .with_client_filename(filename);
                    if let Some(media_type) = header_value(headers, "content-type") {
                        file = file.with_client_media_type(media_type);
                    }
                    add_file(&mut files, &disposition.name, file);
                }
                None => fields.push((disposition.name, String::from_utf8_lossy(content).into_owned())),
            }
        }

        let params = nest_pairs(fields).map_err(|e| MessageError::decode(ctx.media_type, e))?;
        Ok(Decoded { body: ParsedBody::Map(params), files })
    }
}

/// The `boundary` parameter of a `Content-Type` value, quoted or not.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("boundary=")? + "boundary=".len();
    let value = &content_type[start..];

    let boundary = match value.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or_default(),
        None => value.split(|c: char| c == ';' || c == ',' || c.is_whitespace()).next().unwrap_or_default(),
    };
    if boundary.is_empty() { None } else { Some(boundary.to_string()) }
}

/// Cuts the body into part slices, delimiters and framing line breaks removed.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let terminal = format!("--{boundary}--");

    let body = match rfind_bytes(body, terminal.as_bytes()) {
        Some(end) => &body[..end],
        None => body,
    };
    let Some(first) = find_bytes(body, delimiter.as_bytes()) else {
        return Vec::new();
    };

    let crlf_separator = format!("\r\n{delimiter}");
    let separator = if find_bytes(body, crlf_separator.as_bytes()).is_some() { crlf_separator } else { format!("\n{delimiter}") };

    let mut parts = Vec::new();
    let mut rest = &body[first + delimiter.len()..];
    loop {
        rest = strip_line_break_prefix(rest);
        match find_bytes(rest, separator.as_bytes()) {
            Some(end) => {
                parts.push(&rest[..end]);
                rest = &rest[end + separator.len()..];
            }
            None => {
                parts.push(strip_line_break_suffix(rest));
                break;
            }
        }
    }
    parts.retain(|part| !part.is_empty());
    parts
}

/// Splits a part at its first blank line.
fn split_head(part: &[u8]) -> Option<(&str, &[u8])> {
    let (head_end, body_start) = match find_bytes(part, b"\r\n\r\n") {
        Some(index) => (index, index + 4),
        None => find_bytes(part, b"\n\n").map(|index| (index, index + 2))?,
    };
    let head = std::str::from_utf8(&part[..head_end]).ok()?;
    Some((head, &part[body_start..]))
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

fn add_file(files: &mut UploadedFiles, name: &str, file: UploadedFile) {
    match name.strip_suffix("[]") {
        Some(base) => match files.entry(base.to_string()).or_insert_with(|| UploadedEntry::List(Vec::new())) {
            UploadedEntry::List(list) => list.push(file),
            entry @ UploadedEntry::File(_) => *entry = UploadedEntry::List(vec![file]),
        },
        None => {
            files.insert(name.to_string(), UploadedEntry::File(file));
        }
    }
}

fn strip_line_break_prefix(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\r\n").or_else(|| bytes.strip_prefix(b"\n")).unwrap_or(bytes)
}

fn strip_line_break_suffix(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\r\n").or_else(|| bytes.strip_suffix(b"\n")).unwrap_or(bytes)
}

/// The `name` and `filename` parameters of a `Content-Disposition` header.
#[derive(Debug)]
struct Disposition {
    name: String,
    filename: Option<String>,
}

impl Disposition {
    fn find(headers: &str) -> Option<Self> {
        let value = header_value(headers, "content-disposition")?;
        let mut name = None;
        let mut filename = None;

        for param in split_params(value) {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            let raw = raw.trim();
            let unquoted = raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(raw);
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(unquoted.to_string()),
                "filename" => filename = Some(unquoted.to_string()),
                _ => {}
            }
        }

        Some(Self { name: name.filter(|n| !n.is_empty())?, filename })
    }
}

/// Splits header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (index, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(value[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn decode(content_type: &str, body: &[u8]) -> Decoded {
        let ctx = DecodeContext { media_type: "multipart/form-data", content_type };
        MultipartDecoder.decode(body, &ctx).unwrap()
    }

    #[test]
    fn test_scalar_and_file() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"foo\"\r\n\r\nbar\r\n--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\nHELLO\r\n--B--\r\n";
        let decoded = decode("multipart/form-data; boundary=B", body);

        assert_eq!(decoded.body.get("foo"), Some(&json!("bar")));
        assert!(decoded.body.get("f").is_none());

        let file = decoded.files["f"].as_file().unwrap();
        assert_eq!(file.client_filename(), Some("a.txt"));
        assert_eq!(file.size(), 5);
        assert_eq!(file.error(), UploadError::Ok);
        assert_eq!(file.stream().unwrap().to_bytes().unwrap(), Bytes::from_static(b"HELLO"));
    }

    #[test]
    fn test_terminal_marker_without_line_break() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"foo\"\r\n\r\nbar\r\n--B--";
        let decoded = decode("multipart/form-data; boundary=B", body);
        assert_eq!(decoded.body.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn test_quoted_boundary_and_preamble() {
        let body = concat!(
            "preamble text\r\n",
            "--simple boundary\r\n",
            "Content-Disposition: form-data; name=\"a\"\r\n",
            "\r\n",
            "1\r\n",
            "--simple boundary--\r\n",
            "epilogue"
        );
        let decoded = decode("multipart/form-data; boundary=\"simple boundary\"", body.as_bytes());
        assert_eq!(decoded.body, ParsedBody::Map(json!({"a": "1"}).as_object().unwrap().clone()));
    }

    #[test]
    fn test_empty_value_is_kept() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"empty\"\r\n\r\n\r\n--B--\r\n";
        let decoded = decode("multipart/form-data; boundary=B", body);
        assert_eq!(decoded.body.get("empty"), Some(&json!("")));
    }

    #[test]
    fn test_missing_boundary_is_absent() {
        let decoded = decode("multipart/form-data", b"--B\r\n\r\n--B--");
        assert!(decoded.body.is_absent());
        assert!(decoded.files.is_empty());
    }

    #[test]
    fn test_part_without_disposition_is_skipped() {
        let body = b"--B\r\nContent-Type: text/plain\r\n\r\nlost\r\n--B\r\nContent-Disposition: form-data; name=\"kept\"\r\n\r\nyes\r\n--B--\r\n";
        let decoded = decode("multipart/form-data; boundary=B", body);
        assert_eq!(decoded.body.as_map().unwrap().len(), 1);
        assert_eq!(decoded.body.get("kept"), Some(&json!("yes")));
    }

    #[test]
    fn test_file_list_and_media_type() {
        let body = concat!(
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"docs[]\"; filename=\"one.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"docs[]\"; filename=\"two;2.txt\"\r\n",
            "\r\n",
            "second\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"tags[]\"\r\n",
            "\r\n",
            "a\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"tags[]\"\r\n",
            "\r\n",
            "b\r\n",
            "--XyZ--\r\n"
        );
        let decoded = decode("multipart/form-data; charset=utf-8; boundary=XyZ", body.as_bytes());

        let docs = decoded.files["docs"].files();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].client_media_type(), Some("text/plain"));
        assert_eq!(docs[1].client_filename(), Some("two;2.txt"));
        assert_eq!(docs[1].client_media_type(), None);
        assert_eq!(decoded.body.get("tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_bare_line_feeds() {
        let body = b"--B\nContent-Disposition: form-data; name=\"foo\"\n\nbar\n--B--\n";
        let decoded = decode("multipart/form-data; boundary=B", body);
        assert_eq!(decoded.body.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn test_parse_boundary() {
        assert_eq!(parse_boundary("multipart/form-data; boundary=abc").as_deref(), Some("abc"));
        assert_eq!(parse_boundary("multipart/form-data; BOUNDARY=\"a b\"; x=1").as_deref(), Some("a b"));
        assert_eq!(parse_boundary("multipart/form-data; boundary=abc; charset=utf-8").as_deref(), Some("abc"));
        assert_eq!(parse_boundary("multipart/form-data; boundary="), None);
        assert_eq!(parse_boundary("multipart/form-data"), None);
    }
}
