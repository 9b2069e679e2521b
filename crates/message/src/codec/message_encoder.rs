//! Message serialization.
//!
//! Writes `start-line CRLF`, one `Name: value[,value...] CRLF` line per header
//! (names rendered with [`canonical_name`]), a blank line, then the body read
//! from the start.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::protocol::{HeaderMap, HttpMessage, Result, canonical_name};

/// Initial buffer size reserved for the head of a message
const INIT_HEAD_SIZE: usize = 1024;

/// Writes the start line and header lines of `message`.
pub fn encode_head<M: HttpMessage>(message: &M, dst: &mut BytesMut) {
    dst.reserve(INIT_HEAD_SIZE);
    dst.put_slice(message.start_line().as_bytes());
    dst.put_slice(b"\r\n");
    message.write_headers(dst);
}

/// Writes the complete wire form of `message`.
pub fn encode<M: HttpMessage>(message: &M, dst: &mut BytesMut) -> Result<()> {
    encode_head(message, dst);
    dst.put_slice(b"\r\n");
    let body = message.body().to_bytes()?;
    dst.put_slice(&body);
    Ok(())
}

/// Writes every header of `headers`, multiple values joined by commas.
pub fn write_headers(dst: &mut BytesMut, headers: &HeaderMap) {
    for (name, values) in headers {
        write_header(dst, name, &values.join(","));
    }
}

/// Writes a single `Name: value` line.
pub fn write_header(dst: &mut BytesMut, name: &str, value: &str) {
    // writes into BytesMut cannot fail
    let _ = write!(FastWrite(dst), "{}: {value}\r\n", canonical_name(name));
}

/// Writer adapter appending straight into a [`BytesMut`].
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
