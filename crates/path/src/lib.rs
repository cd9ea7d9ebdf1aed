//! Destination paths for downloaded records.
//!
//! A [`PathFormat`] is compiled once from [`PathOptions`] and shared. For each
//! record it hands out a [`PathState`] that builds the directory and filename,
//! writes through a temporary (optionally `.part`) file and finally moves the
//! result into place:
//!
//! ```text
//! set_directory ─▶ set_filename ─▶ [part_enable] ─▶ open ─▶ finalize
//!                                       │
//!                          exists / enum_file on collisions
//! ```
//!
//! Every formatted segment is sanitized. `path-restrict` characters are
//! replaced inside segments, `path-remove` characters are dropped from the
//! whole path, and `path-strip` characters are trimmed from the end of
//! directory names. Rendering never fails, so the only per-record errors are
//! template conditions that can't be evaluated and filesystem trouble.

mod clean;
mod error;
mod expand;
mod format;
mod options;
mod state;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::expand::expand_path;
pub use crate::format::PathFormat;
pub use crate::options::{DEFAULT_DIRECTORY, DEFAULT_FILENAME, PathOptions, Restrict, Strip, Template};
pub use crate::state::{MAX_ENUMERATION, PART_SUFFIX, PathState};
