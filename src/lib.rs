//! Turns a run's metadata records into files on disk.
//!
//! A [`Job`] is built once per run from an [`OutputConfig`]. For each
//! `(url, record)` pair it:
//!
//! 1. ignores the first `offset` records,
//! 2. asks the predicates (`image-unique`, `image-filter`, `image-range`)
//!    whether to keep the record,
//! 3. checks the download archive,
//! 4. builds the destination path and deals with a file already there
//!    according to `skip`,
//! 5. lets a [`Fetcher`] write the content to a temporary `.part` file,
//! 6. moves the file into place and records it in the archive.
//!
//! Progress is reported as a stream of [`JobEvent`]s.
//!
//! ```no_run
//! use futures::StreamExt;
//! use trove::{Config, Job, JobEvent, TextFetcher};
//! use trove_format::TemplateCache;
//! use trove_record::Record;
//! # async fn example() -> trove::Result<()> {
//! let config = Config::default();
//! let mut job = Job::new(&config.output, &TemplateCache::new()).await?;
//! let records = futures::stream::iter([(
//!     "text:hello".to_string(),
//!     Record::new().with("category", "notes").with("id", 1).with("extension", "txt"),
//! )]);
//! let mut events = std::pin::pin!(job.run(records, &TextFetcher));
//! while let Some(event) = events.next().await {
//!     if let JobEvent::Downloaded { path, .. } = event {
//!         println!("{}", path.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod fetch;
mod job;
mod stream;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::fetch::{Fetched, Fetcher, MockFetcher, TextFetcher};
pub use crate::job::Job;
pub use crate::stream::{JobEvent, Signal};
pub use trove_config::{Config, OutputConfig};
