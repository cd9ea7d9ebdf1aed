use crate::error::{ErrorKind, Result};
use crate::fetch::{Fetched, Fetcher};
use crate::stream::{JobEvent, Signal};
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;
use trove_archive::{DEFAULT_ARCHIVE_FORMAT, DEFAULT_ARCHIVE_PREFIX, DownloadArchive};
use trove_config::{OutputConfig, Skip};
use trove_filter::{ErrorKind as FilterErrorKind, FilterPredicate, Predicate, Predicates, RangePredicate, UniquePredicate};
use trove_format::TemplateCache;
use trove_path::{PathFormat, expand_path};
use trove_record::Record;

/// Everything needed to turn a run's records into files: the compiled path
/// format, the predicates deciding which records to keep, and the archive of
/// what was downloaded before.
pub struct Job {
    format: Arc<PathFormat>,
    predicates: Predicates,
    archive: Option<DownloadArchive>,
    skip: Skip,
    part: bool,
    part_directory: Option<PathBuf>,
    offset: u64,
}

impl Job {
    /// Compiles every template and expression in `config` and opens the
    /// archive, if one is configured.
    #[instrument(skip_all)]
    pub async fn new(config: &OutputConfig, cache: &TemplateCache) -> Result<Self> {
        let options = config.path_options().or_raise(|| ErrorKind::Config)?;
        let format = PathFormat::new(&options, cache).or_raise(|| ErrorKind::Config)?;
        let predicates = predicates(config).or_raise(|| ErrorKind::Config)?;
        let archive = match &config.archive {
            Some(path) => {
                let prefix = config.archive_prefix.as_deref().unwrap_or(DEFAULT_ARCHIVE_PREFIX);
                let format = config.archive_format.as_deref().unwrap_or(DEFAULT_ARCHIVE_FORMAT);
                let keygen = DownloadArchive::keygen(cache, prefix, format).or_raise(|| ErrorKind::Config)?;
                let archive = DownloadArchive::open(expand_path(path), keygen).await.or_raise(|| ErrorKind::Archive)?;
                Some(archive)
            },
            None => None,
        };
        tracing::debug!(predicates = predicates.len(), archive = archive.is_some(), "prepared job");
        Ok(Self {
            format: Arc::new(format),
            predicates,
            archive,
            skip: config.skip,
            part: config.part,
            part_directory: config.part_directory.as_deref().map(|dir| PathBuf::from(expand_path(dir))),
            offset: config.offset,
        })
    }

    /// Uses `archive` instead of the configured one.
    pub fn with_archive(mut self, archive: DownloadArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn format(&self) -> &Arc<PathFormat> {
        &self.format
    }

    pub fn archive(&self) -> Option<&DownloadArchive> {
        self.archive.as_ref()
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Runs one record through the predicates, the archive and the fetcher.
    #[instrument(skip_all, fields(url = %url))]
    pub(crate) async fn handle<F>(&mut self, url: String, record: Record, fetcher: &F) -> JobEvent
    where
        F: Fetcher + ?Sized,
    {
        match self.predicates.check(&url, &record) {
            Ok(true) => {},
            Ok(false) => return JobEvent::Filtered { url },
            Err(err) => {
                let signal = match &*err {
                    FilterErrorKind::Stop => Some(Signal::Stop),
                    FilterErrorKind::Terminate => Some(Signal::Terminate),
                    _ => None,
                };
                return match signal {
                    Some(signal) => JobEvent::Stopped(signal),
                    None => JobEvent::Failed { url, error: err.raise(ErrorKind::Filter) },
                };
            },
        }
        match self.download(&url, record, fetcher).await {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = ?error, "download failed");
                JobEvent::Failed { url, error }
            },
        }
    }

    async fn download<F>(&self, url: &str, mut record: Record, fetcher: &F) -> Result<JobEvent>
    where
        F: Fetcher + ?Sized,
    {
        let url = url.to_string();
        if let Some(archive) = &self.archive
            && archive.check(&mut record).await.or_raise(|| ErrorKind::Archive)?
        {
            return Ok(JobEvent::Archived { url });
        }

        let mut state = self.format.state();
        state.set_directory(&record).or_raise(|| ErrorKind::Path)?;
        state.set_filename(&record).or_raise(|| ErrorKind::Path)?;
        if state.exists().await {
            match self.skip {
                Skip::Skip => {
                    self.archive_add(state.record()).await?;
                    return Ok(JobEvent::Exists { url, path: PathBuf::from(state.path()) });
                },
                Skip::Overwrite => {},
                Skip::Enumerate => state.enum_file().await.or_raise(|| ErrorKind::Path)?,
            }
        }
        let prepared = match self.part {
            true => state.part_enable(self.part_directory.as_deref()),
            false => state.fix_extension(),
        };
        prepared.or_raise(|| ErrorKind::Path)?;

        match fetcher.fetch(&url, &mut state).await? {
            Fetched::Rejected => {
                state.mark_delete();
                state.finalize().await.or_raise(|| ErrorKind::Path)?;
                Ok(JobEvent::Rejected { url })
            },
            Fetched::Complete => {
                state.fix_extension().or_raise(|| ErrorKind::Path)?;
                state.finalize().await.or_raise(|| ErrorKind::Path)?;
                self.archive_add(state.record()).await?;
                tracing::info!(path = %state.path(), "downloaded");
                Ok(JobEvent::Downloaded { url, path: PathBuf::from(state.path()) })
            },
        }
    }

    async fn archive_add(&self, record: &Record) -> Result<()> {
        if let Some(archive) = &self.archive {
            archive.add(record).await.or_raise(|| ErrorKind::Archive)?;
        }
        Ok(())
    }
}

/// Duplicates first, then the filter expression, then the range, so the
/// range counts only records that got past the others.
fn predicates(config: &OutputConfig) -> trove_filter::Result<Predicates> {
    let mut predicates = Predicates::new();
    if config.image_unique {
        predicates.push(UniquePredicate::new());
    }
    if let Some(filter) = &config.image_filter {
        predicates.push(FilterPredicate::new(filter)?);
    }
    if let Some(range) = &config.image_range {
        predicates.push(RangePredicate::new(range)?);
    }
    Ok(predicates)
}
