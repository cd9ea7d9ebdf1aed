//! Job Error Types
//!
//! `Config` and `Archive` are raised while building a [`Job`](crate::Job) and
//! are fatal. The others are raised for a single record and reported through
//! [`JobEvent::Failed`](crate::JobEvent::Failed) without ending the run.

use derive_more::{Display, Error};

/// A job error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for job operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid output configuration")]
    Config,
    #[display("download archive is unavailable")]
    Archive,
    #[display("filter expression failed")]
    Filter,
    #[display("unable to build the destination path")]
    Path,
    #[display("unable to fetch {_0}")]
    Fetch(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
