//! Path Error Types
//!
//! `FilenameFormat`, `DirectoryFormat` and `Restrict` come from bad
//! configuration and are raised when compiling a [`PathFormat`](crate::PathFormat).
//! The filename and directory kinds are also raised when a template condition
//! fails for a particular record. Everything else is filesystem trouble.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A path error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for path operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid filename format: {_0}")]
    FilenameFormat(#[error(not(source))] String),
    #[display("invalid directory format: {_0}")]
    DirectoryFormat(#[error(not(source))] String),
    /// A character class in `path-restrict` or `path-remove` failed to compile.
    #[display("invalid character class: {_0}")]
    Restrict(#[error(not(source))] String),
    /// Every enumerated name up to the limit is taken.
    #[display("no free file name for {}", _0.display())]
    Enumeration(#[error(not(source))] PathBuf),
    #[display("invalid modification time: {_0}")]
    Mtime(#[error(not(source))] String),
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
