//! Raw message splitting.
//!
//! The decoder accepts both `\r\n` and bare `\n` line endings. The first blank
//! line ends the header block; everything after it is the body and is kept as
//! raw bytes.

use bytes::Bytes;
use tracing::trace;

use crate::protocol::{HeaderMap, MessageError, Result};
use crate::utils::ensure;

/// A message split into its three wire sections.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub start_line: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Splits `buffer` into start line, headers and body.
///
/// Header lines are split on their first `:` with both sides trimmed, repeated
/// names accumulate, and lines without a `:` are skipped.
///
/// # Errors
///
/// Returns [`MessageError::Malformed`] when the buffer is empty, when the
/// header block is not text, when the start line is blank or when no blank
/// line separates the headers from the body.
pub fn parse_message(buffer: &[u8]) -> Result<RawMessage> {
    ensure!(!buffer.is_empty(), MessageError::malformed("empty message"));

    let mut lines = Vec::new();
    let mut offset = 0;
    let body_offset = loop {
        let Some(newline) = buffer[offset..].iter().position(|b| *b == b'\n') else {
            return Err(MessageError::malformed("missing blank line between headers and body"));
        };
        let line = &buffer[offset..offset + newline];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        offset += newline + 1;

        if line.is_empty() {
            break offset;
        }
        lines.push(line);
    };

    let mut lines = lines.into_iter().map(|line| {
        std::str::from_utf8(line).map_err(|e| MessageError::malformed(format!("header section is not text: {e}")))
    });

    let start_line = match lines.next() {
        Some(line) => line?.trim().to_string(),
        None => return Err(MessageError::malformed("missing start line")),
    };
    ensure!(!start_line.is_empty(), MessageError::malformed("missing start line"));

    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line?;
        let Some((name, value)) = line.split_once(':') else {
            trace!(line = %line, "skip header line without colon");
            continue;
        };
        headers.append_unchecked(name.trim().to_string(), vec![value.trim().to_string()]);
    }

    let body = Bytes::copy_from_slice(&buffer[body_offset..]);
    trace!(start_line = %start_line, header_count = headers.len(), body_size = body.len(), "parsed raw message");

    Ok(RawMessage { start_line, headers, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_parse_request() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Host: www.example.com
        Accept: text/html
        accept: application/json
        Content-Type : application/x-www-form-urlencoded

        foo=bar&baz=1"##};

        let message = parse_message(str.as_bytes()).unwrap();

        assert_eq!(message.start_line, "POST /submit HTTP/1.1");
        assert_eq!(message.headers.len(), 3);
        assert_eq!(message.headers.get("host"), ["www.example.com"]);
        assert_eq!(message.headers.get("accept"), ["text/html", "application/json"]);
        assert_eq!(message.headers.get("content-type"), ["application/x-www-form-urlencoded"]);
        assert_eq!(message.body, Bytes::from_static(b"foo=bar&baz=1"));
    }

    #[test]
    fn test_parse_crlf() {
        let message = parse_message(b"GET /Test HTTP/1.1\r\nHost: www.example.com\r\n\r\n").unwrap();
        assert_eq!(message.start_line, "GET /Test HTTP/1.1");
        assert_eq!(message.headers.get_line("Host"), "www.example.com");
        assert!(message.body.is_empty());
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let message = parse_message(b"GET / HTTP/1.1\r\nHost: localhost:8080\r\n\r\n").unwrap();
        assert_eq!(message.headers.get("host"), ["localhost:8080"]);
    }

    #[test]
    fn test_skip_line_without_colon() {
        let message = parse_message(b"GET / HTTP/1.1\r\nnot a header\r\nX-A: 1\r\n\r\n").unwrap();
        assert_eq!(message.headers.len(), 1);
    }

    #[test]
    fn test_binary_body_is_kept() {
        let mut buffer = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n".to_vec();
        buffer.extend_from_slice(&[0, 159, 146, 150]);
        let message = parse_message(&buffer).unwrap();
        assert_eq!(message.body.as_ref(), &[0, 159, 146, 150]);
    }

    #[test]
    fn test_body_may_contain_blank_lines() {
        let message = parse_message(b"POST / HTTP/1.1\r\n\r\nline one\r\n\r\nline two").unwrap();
        assert!(message.headers.is_empty());
        assert_eq!(message.body, Bytes::from_static(b"line one\r\n\r\nline two"));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse_message(b""), Err(MessageError::Malformed { .. })));
        assert!(matches!(parse_message(b"GET / HTTP/1.1\r\nHost: a\r\n"), Err(MessageError::Malformed { .. })));
        assert!(matches!(parse_message(b"\r\n\r\nbody"), Err(MessageError::Malformed { .. })));
        assert!(matches!(parse_message(b"GET / HTTP/1.1\r\nX: \xff\r\n\r\n"), Err(MessageError::Malformed { .. })));
    }
}
