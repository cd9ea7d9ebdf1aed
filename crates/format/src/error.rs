//! Formatter Error Types
//!
//! Only compilation can fail. Rendering a compiled template never does: any
//! field that cannot be resolved is replaced by the template's default value.

use derive_more::{Display, Error};

/// A template error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for template compilation.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid template: {_0}")]
    Template(#[error(not(source))] String),
}

impl ErrorKind {
    pub(crate) fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
