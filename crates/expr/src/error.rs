//! Expression Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An expression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for expression compilation and evaluation.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// [`Syntax`](Self::Syntax) is the only compile-time error; everything else is
/// raised while evaluating against a record. [`Stop`](Self::Stop) and
/// [`Terminate`](Self::Terminate) are control signals raised on purpose by
/// `abort()` and `terminate()`, not faults.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid expression: {_0}")]
    Syntax(#[error(not(source))] String),
    #[display("name '{_0}' is not defined")]
    Name(#[error(not(source))] String),
    #[display("type error: {_0}")]
    Type(#[error(not(source))] String),
    #[display("value error: {_0}")]
    Value(#[error(not(source))] String),
    #[display("index out of range")]
    Index,
    #[display("key not found: {_0}")]
    Key(#[error(not(source))] String),
    #[display("division by zero")]
    ZeroDivision,
    #[display("extraction stopped")]
    Stop,
    #[display("extraction terminated")]
    Terminate,
}

impl ErrorKind {
    /// Returns `true` for the deliberate `abort()`/`terminate()` signals.
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Stop | Self::Terminate)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
