//! Byte streams backing message bodies.
//!
//! A [`Stream`] exclusively owns one [`Source`] and remembers three capability
//! flags (readable, writable, seekable) computed once when it is created. The
//! readable/writable flags come from the open mode string, the seekable flag
//! from the source itself. Every operation checks its capability first and
//! fails with [`MessageError::MissingCapability`] otherwise.
//!
//! The source is released when the stream is dropped or [`Stream::close`]d;
//! [`Stream::detach`] hands it back to the caller instead.
//!
//! [`Body`] is the shared handle messages hold: cloning a message clones the
//! handle, not the bytes.

mod body;
mod source;

pub use body::Body;
pub use source::{Source, Unseekable};

use std::fs::OpenOptions;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::protocol::{Capability, MessageError, Result};
use crate::utils::ensure;

/// Mode used for streams created in memory.
const MEMORY_MODE: &str = "r+";

/// A byte source with capability checks and an implicit cursor.
#[derive(Debug)]
pub struct Stream {
    source: Option<Box<dyn Source>>,
    readable: bool,
    writable: bool,
    seekable: bool,
    eof: bool,
    mode: String,
    uri: Option<String>,
    limit: Option<Limit>,
}

/// Size cap of a bounded stream.
///
/// `written` stands in for the size of sources that cannot report one.
#[derive(Debug, Clone, Copy)]
struct Limit {
    max: u64,
    written: u64,
}

impl Stream {
    /// Wraps an already opened source; `mode` is the mode it was opened with.
    pub fn new<S: Source + 'static>(source: S, mode: &str) -> Self {
        let seekable = source.is_seekable();
        Self {
            source: Some(Box::new(source)),
            readable: is_readable_mode(mode),
            writable: is_writable_mode(mode),
            seekable,
            eof: false,
            mode: mode.to_string(),
            uri: None,
            limit: None,
        }
    }

    /// An empty, readable, writable and seekable stream held in memory.
    pub fn memory() -> Self {
        Self::new(Cursor::new(Vec::new()), MEMORY_MODE)
    }

    /// An in-memory stream holding `bytes`, positioned at the start.
    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self::new(Cursor::new(bytes.into()), MEMORY_MODE)
    }

    /// A read-only, non-seekable stream over a forward-only reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::new(Unseekable::new(reader), "r")
    }

    /// Opens the file at `path` with an `fopen`-style mode such as `r`, `w+` or `a+b`.
    pub fn open<P: AsRef<Path>>(path: P, mode: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = open_options(mode)?.open(path)?;
        trace!(path = %path.display(), mode, "opened file stream");
        let mut stream = Self::new(file, mode);
        stream.uri = Some(path.display().to_string());
        Ok(stream)
    }

    /// An empty in-memory stream that accepts at most `max` bytes.
    pub fn limited(max: u64) -> Self {
        Self::memory().with_limit(max)
    }

    /// Caps the total size of this stream at `max` bytes.
    ///
    /// Writes that would grow the stream past the cap are truncated. Once the
    /// size reaches the cap, including content present before the cap was
    /// set, the stream stops being writable.
    pub fn with_limit(mut self, max: u64) -> Self {
        self.limit = Some(Limit { max, written: 0 });
        if self.limited_size().is_some_and(|size| size >= max) {
            self.writable = false;
        }
        self
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Whether the source has been detached or closed.
    pub fn is_detached(&self) -> bool {
        self.source.is_none()
    }

    /// The mode the source was opened with.
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// The path of a file-backed stream.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Reads up to `len` bytes from the current position.
    pub fn read(&mut self, len: usize) -> Result<Bytes> {
        ensure!(self.readable, MessageError::missing_capability(Capability::Readable));
        if len == 0 {
            return Ok(Bytes::new());
        }

        let source = self.source_mut(Capability::Readable)?;
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        let read = source.take(len as u64).read_to_end(&mut buf)?;
        if read < len {
            self.eof = true;
        }
        Ok(Bytes::from(buf))
    }

    /// Reads everything from the current position to the end.
    pub fn contents(&mut self) -> Result<Bytes> {
        ensure!(self.readable, MessageError::missing_capability(Capability::Readable));
        let source = self.source_mut(Capability::Readable)?;
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        self.eof = true;
        Ok(Bytes::from(buf))
    }

    /// Reads the whole stream, rewinding first when the source allows it.
    pub fn to_bytes(&mut self) -> Result<Bytes> {
        if self.seekable {
            self.rewind()?;
        }
        self.contents()
    }

    /// Writes `data` at the current position and returns how many bytes were taken.
    pub fn write<D: AsRef<[u8]>>(&mut self, data: D) -> Result<usize> {
        ensure!(self.writable, MessageError::missing_capability(Capability::Writable));
        let mut data = data.as_ref();

        if let (Some(limit), Some(size)) = (self.limit, self.limited_size()) {
            let remaining = limit.max.saturating_sub(size);
            if (data.len() as u64) > remaining {
                trace!(max = limit.max, size, dropped = data.len() as u64 - remaining, "truncating write at stream limit");
                data = &data[..usize::try_from(remaining).unwrap_or(usize::MAX)];
            }
        }

        let source = self.source_mut(Capability::Writable)?;
        source.write_all(data)?;

        if let Some(limit) = self.limit.as_mut() {
            limit.written += data.len() as u64;
        }
        if let (Some(limit), Some(size)) = (self.limit, self.limited_size()) {
            if size >= limit.max {
                self.writable = false;
            }
        }
        Ok(data.len())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        ensure!(self.seekable, MessageError::missing_capability(Capability::Seekable));
        let source = self.source_mut(Capability::Seekable)?;
        let offset = source.seek(pos)?;
        self.eof = false;
        Ok(offset)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// The current cursor position.
    pub fn tell(&mut self) -> Result<u64> {
        let source = self.source_mut(Capability::Readable)?;
        Ok(source.stream_position()?)
    }

    /// Whether a read has reached the end of the source.
    pub fn eof(&self) -> bool {
        self.source.is_none() || self.eof
    }

    /// The total size of the source, when it can be determined without consuming it.
    pub fn size(&mut self) -> Option<u64> {
        if !self.seekable {
            return None;
        }
        let source = self.source.as_mut()?;
        let current = source.stream_position().ok()?;
        let end = source.seek(SeekFrom::End(0)).ok()?;
        source.seek(SeekFrom::Start(current)).ok()?;
        Some(end)
    }

    /// Takes the source out of the stream, leaving it unusable.
    pub fn detach(&mut self) -> Option<Box<dyn Source>> {
        self.readable = false;
        self.writable = false;
        self.seekable = false;
        self.uri = None;
        self.source.take()
    }

    /// Releases the source, if still owned.
    pub fn close(&mut self) {
        if let Some(mut source) = self.detach() {
            if let Err(e) = source.flush() {
                warn!(error = %e, "failed to flush stream source on close");
            }
        }
    }

    /// The size checked against the cap of a bounded stream.
    fn limited_size(&mut self) -> Option<u64> {
        let written = self.limit?.written;
        Some(self.size().unwrap_or(written))
    }

    fn source_mut(&mut self, capability: Capability) -> Result<&mut Box<dyn Source>> {
        self.source.as_mut().ok_or(MessageError::missing_capability(capability))
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::memory()
    }
}

fn base_mode(mode: &str) -> String {
    mode.chars().filter(|c| *c != 'b' && *c != 't').collect()
}

/// `r`, `r+` and every `+` mode read.
fn is_readable_mode(mode: &str) -> bool {
    let base = base_mode(mode);
    base.starts_with('r') || base.contains('+')
}

/// Everything except plain `r` writes.
fn is_writable_mode(mode: &str) -> bool {
    let base = base_mode(mode);
    base.contains('+') || base.contains(['w', 'a', 'x', 'c'])
}

/// Translates an `fopen`-style mode into [`OpenOptions`].
fn open_options(mode: &str) -> Result<OpenOptions> {
    let base = base_mode(mode);
    let mut options = OpenOptions::new();
    match base.as_str() {
        "r" => options.read(true),
        "r+" => options.read(true).write(true),
        "w" => options.write(true).create(true).truncate(true),
        "w+" => options.read(true).write(true).create(true).truncate(true),
        "a" => options.append(true).create(true),
        "a+" => options.read(true).append(true).create(true),
        "x" => options.write(true).create_new(true),
        "x+" => options.read(true).write(true).create_new(true),
        "c" => options.write(true).create(true),
        "c+" => options.read(true).write(true).create(true),
        _ => return Err(MessageError::invalid_argument(format!("unsupported stream mode: {mode}"))),
    };
    Ok(options)
}
