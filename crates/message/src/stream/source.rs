use std::fmt;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

/// A byte source a [`Stream`](super::Stream) can own.
///
/// Anything that can be read, written and repositioned qualifies; sources that
/// cannot honor one of those report it through their `io::Result`s and, for
/// repositioning, through [`Source::is_seekable`].
pub trait Source: Read + Write + Seek + Send + fmt::Debug {
    fn is_seekable(&self) -> bool {
        true
    }
}

impl Source for io::Cursor<Vec<u8>> {}

impl Source for std::fs::File {}

/// Wraps a forward-only reader, such as a pipe or a socket half.
///
/// Writes are refused and the only supported seek is `SeekFrom::Current(0)`,
/// which reports how many bytes were consumed so far.
pub struct Unseekable<R> {
    reader: R,
    consumed: u64,
}

impl<R> Unseekable<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, consumed: 0 }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> fmt::Debug for Unseekable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unseekable").field("consumed", &self.consumed).finish_non_exhaustive()
    }
}

impl<R: Read> Read for Unseekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R> Write for Unseekable<R> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(ErrorKind::Unsupported, "source is read only"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R> Seek for Unseekable<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.consumed),
            _ => Err(io::Error::new(ErrorKind::Unsupported, "source is not seekable")),
        }
    }
}

impl<R: Read + Send> Source for Unseekable<R> {
    fn is_seekable(&self) -> bool {
        false
    }
}
