//! Predicate Error Types
//!
//! `Range` is a configuration error raised while building a predicate. The
//! others are raised while checking a record: `Filter` rejects only the record
//! at hand, while `Stop` and `Terminate` end the whole run.

use derive_more::{Display, Error};

/// A predicate error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for predicate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid range: {_0}")]
    Range(#[error(not(source))] String),
    #[display("invalid filter expression: {_0}")]
    Expression(#[error(not(source))] String),
    /// The filter expression failed while evaluating a record.
    #[display("filter failed: {_0}")]
    Filter(#[error(not(source))] String),
    #[display("stop extraction")]
    Stop,
    #[display("terminate extraction")]
    Terminate,
}

impl ErrorKind {
    /// `Stop` and `Terminate` unwind the run rather than fail a record.
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Stop | Self::Terminate)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
