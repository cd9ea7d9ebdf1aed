use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::collections::{HashMap, HashSet};
use tokio::io::AsyncWriteExt;
use trove_filter::TEXT_SCHEME;
use trove_path::PathState;

/// How a fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// The bytes are in the temporary file and it can be moved into place.
    Complete,
    /// The content turned out to be unwanted. The temporary file is removed.
    Rejected,
}

/// Writes the content behind a URL to disk.
///
/// Implementations write through [`PathState::open`] (or
/// [`open_append`](PathState::open_append) to resume a partial download) and
/// may call [`PathState::set_extension`] once the real file type is known.
/// They never move the file into place; the job does that.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, state: &mut PathState) -> Result<Fetched>;
}

async fn write(url: &str, state: &mut PathState, data: &[u8]) -> Result<()> {
    let mut file = state.open().await.or_raise(|| ErrorKind::Path)?;
    file.write_all(data).await.or_raise(|| ErrorKind::Fetch(url.to_string()))?;
    file.flush().await.or_raise(|| ErrorKind::Fetch(url.to_string()))?;
    Ok(())
}

/// Handles `text:` URLs by writing everything after the scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFetcher;

#[async_trait]
impl Fetcher for TextFetcher {
    async fn fetch(&self, url: &str, state: &mut PathState) -> Result<Fetched> {
        let text = url.strip_prefix(TEXT_SCHEME).ok_or_raise(|| ErrorKind::Fetch(url.to_string()))?;
        write(url, state, text.as_bytes()).await?;
        Ok(Fetched::Complete)
    }
}

/// In-memory fetcher serving fixed content per URL.
///
/// Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    files: HashMap<String, Vec<u8>>,
    rejected: HashSet<String>,
}

impl MockFetcher {
    pub fn with_files<U, D>(files: impl IntoIterator<Item = (U, D)>) -> Self
    where
        U: Into<String>,
        D: Into<Vec<u8>>,
    {
        Self {
            files: files.into_iter().map(|(url, data)| (url.into(), data.into())).collect(),
            rejected: HashSet::new(),
        }
    }

    /// Writes the content for `url` and then rejects it.
    pub fn rejecting(mut self, url: impl Into<String>) -> Self {
        self.rejected.insert(url.into());
        self
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, state: &mut PathState) -> Result<Fetched> {
        let data = self.files.get(url).ok_or_raise(|| ErrorKind::Fetch(url.to_string()))?;
        write(url, state, data).await?;
        match self.rejected.contains(url) {
            true => Ok(Fetched::Rejected),
            false => Ok(Fetched::Complete),
        }
    }
}
