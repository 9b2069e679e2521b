//! Uploaded files.
//!
//! An [`UploadedFile`] is backed either by a file on disk (a temporary upload
//! file) or by a [`Body`] stream, never both. Clones share the backing
//! resource and its moved state: after one clone moved the file, every clone
//! refuses [`UploadedFile::stream`] and [`UploadedFile::move_to`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::protocol::{MessageError, Result};
use crate::stream::{Body, Stream};
use crate::utils::ensure;

/// Uploaded files by form field name.
pub type UploadedFiles = BTreeMap<String, UploadedEntry>;

/// One form field worth of uploads.
#[derive(Debug, Clone)]
pub enum UploadedEntry {
    /// A plain `name="field"` upload.
    File(UploadedFile),
    /// Array-style fields such as `name="files[]"`.
    List(Vec<UploadedFile>),
}

impl UploadedEntry {
    /// The file of a single-file field.
    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            UploadedEntry::File(file) => Some(file),
            UploadedEntry::List(_) => None,
        }
    }

    /// Every file of the field, one for a single-file field.
    pub fn files(&self) -> &[UploadedFile] {
        match self {
            UploadedEntry::File(file) => std::slice::from_ref(file),
            UploadedEntry::List(files) => files,
        }
    }
}

/// Upload status codes, numbered like the CGI upload error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    /// The upload succeeded.
    Ok,
    /// Larger than the server-wide upload limit.
    IniSize,
    /// Larger than the limit the form declared.
    FormSize,
    /// Only part of the file arrived.
    Partial,
    NoFile,
    /// No temporary directory to store the upload in.
    NoTmpDir,
    CantWrite,
    /// Stopped by a server extension.
    Extension,
}

impl UploadError {
    /// The numeric code; 5 is unassigned.
    pub fn code(self) -> u8 {
        match self {
            UploadError::Ok => 0,
            UploadError::IniSize => 1,
            UploadError::FormSize => 2,
            UploadError::Partial => 3,
            UploadError::NoFile => 4,
            UploadError::NoTmpDir => 6,
            UploadError::CantWrite => 7,
            UploadError::Extension => 8,
        }
    }
}

impl TryFrom<i64> for UploadError {
    type Error = MessageError;

    fn try_from(code: i64) -> Result<Self> {
        Ok(match code {
            0 => UploadError::Ok,
            1 => UploadError::IniSize,
            2 => UploadError::FormSize,
            3 => UploadError::Partial,
            4 => UploadError::NoFile,
            6 => UploadError::NoTmpDir,
            7 => UploadError::CantWrite,
            8 => UploadError::Extension,
            _ => return Err(MessageError::invalid_argument(format!("invalid upload error code: {code}"))),
        })
    }
}

#[derive(Debug)]
enum Origin {
    File { path: PathBuf, stream: Option<Body> },
    Stream(Body),
    /// The upload failed, there is nothing to read.
    Unavailable,
    Moved,
}

/// A file received through a form upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    size: u64,
    error: UploadError,
    client_filename: Option<String>,
    client_media_type: Option<String>,
    origin: Arc<Mutex<Origin>>,
}

impl UploadedFile {
    /// An upload stored at `path`; the path is ignored when `error` is not [`UploadError::Ok`].
    pub fn from_path<P: Into<PathBuf>>(path: P, size: u64, error: UploadError) -> Self {
        let origin = if error == UploadError::Ok { Origin::File { path: path.into(), stream: None } } else { Origin::Unavailable };
        Self::with_origin(origin, size, error)
    }

    /// An upload held by a stream; the stream is ignored when `error` is not [`UploadError::Ok`].
    pub fn from_stream<B: Into<Body>>(body: B, size: u64, error: UploadError) -> Self {
        let origin = if error == UploadError::Ok { Origin::Stream(body.into()) } else { Origin::Unavailable };
        Self::with_origin(origin, size, error)
    }

    fn with_origin(origin: Origin, size: u64, error: UploadError) -> Self {
        Self { size, error, client_filename: None, client_media_type: None, origin: Arc::new(Mutex::new(origin)) }
    }

    /// Records the filename from the part's `Content-Disposition`.
    pub fn with_client_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.client_filename = Some(filename.into());
        self
    }

    /// Records the part's `Content-Type`.
    pub fn with_client_media_type<S: Into<String>>(mut self, media_type: S) -> Self {
        self.client_media_type = Some(media_type.into());
        self
    }

    /// The size reported for the upload, in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn error(&self) -> UploadError {
        self.error
    }

    /// Whether the status is anything but [`UploadError::Ok`].
    pub fn is_error(&self) -> bool {
        self.error != UploadError::Ok
    }

    /// The filename the client sent; not to be trusted.
    pub fn client_filename(&self) -> Option<&str> {
        self.client_filename.as_deref()
    }

    /// The media type the client sent; not to be trusted.
    pub fn client_media_type(&self) -> Option<&str> {
        self.client_media_type.as_deref()
    }

    /// Whether [`UploadedFile::move_to`] already succeeded on this file or a clone.
    pub fn is_moved(&self) -> bool {
        matches!(*self.lock(), Origin::Moved)
    }

    /// The upload contents. A file-backed upload is opened on first access.
    pub fn stream(&self) -> Result<Body> {
        let mut origin = self.lock();
        self.validate_active(&origin)?;
        match &mut *origin {
            Origin::Stream(body) => Ok(body.clone()),
            Origin::File { path, stream } => {
                if let Some(body) = stream {
                    return Ok(body.clone());
                }
                let body = Body::new(Stream::open(path.as_path(), "r+")?);
                *stream = Some(body.clone());
                Ok(body)
            }
            Origin::Unavailable | Origin::Moved => Err(MessageError::upload("upload has no contents")),
        }
    }

    /// Moves the upload to `target`. Works once; later calls fail.
    pub fn move_to<P: AsRef<Path>>(&self, target: P) -> Result<()> {
        let target = target.as_ref();
        let mut origin = self.lock();
        self.validate_active(&origin)?;
        ensure!(!target.as_os_str().is_empty(), MessageError::invalid_argument("target path must not be empty"));

        match std::mem::replace(&mut *origin, Origin::Moved) {
            Origin::File { path, stream } => {
                drop(stream);
                if let Err(e) = move_file(&path, target) {
                    *origin = Origin::File { path, stream: None };
                    return Err(MessageError::upload(format!("failed to move upload to {}: {e}", target.display())));
                }
            }
            Origin::Stream(body) => {
                let written = body.to_bytes().and_then(|bytes| fs::write(target, bytes).map_err(MessageError::from));
                if let Err(e) = written {
                    *origin = Origin::Stream(body);
                    return Err(MessageError::upload(format!("failed to write upload to {}: {e}", target.display())));
                }
                body.lock().close();
            }
            other @ (Origin::Unavailable | Origin::Moved) => {
                *origin = other;
                return Err(MessageError::upload("upload has no contents"));
            }
        }
        debug!(target = %target.display(), size = self.size, "moved uploaded file");
        Ok(())
    }

    fn validate_active(&self, origin: &Origin) -> Result<()> {
        ensure!(!self.is_error(), MessageError::upload(format!("upload failed with error code {}", self.error.code())));
        ensure!(!matches!(origin, Origin::Moved), MessageError::upload("upload has already been moved"));
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Origin> {
        self.origin.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    warn!(from = %from.display(), to = %to.display(), "rename failed, copying upload instead");
    fs::copy(from, to)?;
    fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_stream_upload() {
        let file = UploadedFile::from_stream("HELLO", 5, UploadError::Ok)
            .with_client_filename("a.txt")
            .with_client_media_type("text/plain");

        assert_eq!(file.size(), 5);
        assert_eq!(file.client_filename(), Some("a.txt"));
        assert_eq!(file.client_media_type(), Some("text/plain"));
        assert_eq!(file.stream().unwrap().to_bytes().unwrap(), Bytes::from_static(b"HELLO"));
    }

    #[test]
    fn test_move_stream_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("moved.txt");
        let file = UploadedFile::from_stream("HELLO", 5, UploadError::Ok);
        let clone = file.clone();

        file.move_to(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"HELLO");
        assert!(clone.is_moved());

        assert!(matches!(file.move_to(&target), Err(MessageError::Upload { .. })));
        assert!(matches!(clone.stream(), Err(MessageError::Upload { .. })));
    }

    #[test]
    fn test_move_file_upload() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upload.tmp");
        fs::write(&source, b"on disk").unwrap();

        let file = UploadedFile::from_path(&source, 7, UploadError::Ok);
        assert_eq!(file.stream().unwrap().to_bytes().unwrap(), Bytes::from_static(b"on disk"));

        let target = dir.path().join("kept.txt");
        file.move_to(&target).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"on disk");
        assert!(file.move_to(dir.path().join("again.txt")).is_err());
    }

    #[test]
    fn test_empty_target() {
        let file = UploadedFile::from_stream("x", 1, UploadError::Ok);
        assert!(matches!(file.move_to(""), Err(MessageError::InvalidArgument { .. })));
        assert!(!file.is_moved());
    }

    #[test]
    fn test_failed_upload_has_no_stream() {
        let file = UploadedFile::from_stream("partial", 7, UploadError::Partial);
        assert!(file.is_error());
        assert!(matches!(file.stream(), Err(MessageError::Upload { .. })));
        assert!(matches!(file.move_to("/tmp/never"), Err(MessageError::Upload { .. })));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(UploadError::try_from(0).unwrap(), UploadError::Ok);
        assert_eq!(UploadError::try_from(6).unwrap(), UploadError::NoTmpDir);
        assert_eq!(UploadError::CantWrite.code(), 7);
        assert!(UploadError::try_from(5).is_err());
    }

    #[test]
    fn test_entry_files() {
        let one = UploadedFile::from_stream("a", 1, UploadError::Ok);
        let entry = UploadedEntry::List(vec![one.clone(), one.clone()]);
        assert_eq!(entry.files().len(), 2);
        assert!(entry.as_file().is_none());
        assert_eq!(UploadedEntry::File(one).files().len(), 1);
    }
}
