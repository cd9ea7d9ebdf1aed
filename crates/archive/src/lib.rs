//! Download archive: remembers which items were already downloaded so later
//! runs can skip them.
//!
//! The store is a single SQLite table of unique text keys. Each key is
//! rendered from the item's record with a template (by default `{id}` behind
//! a per-site prefix), so two records describe the same item exactly when
//! their keys match.

mod archive;
pub mod error;

pub use crate::archive::{ARCHIVE_KEY, DEFAULT_ARCHIVE_FORMAT, DEFAULT_ARCHIVE_PREFIX, DownloadArchive};
pub use crate::error::{Error, ErrorKind, Result};
