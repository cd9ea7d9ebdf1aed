use crate::error::Error;
use crate::fetch::Fetcher;
use crate::job::Job;
use async_stream::stream;
use futures::Stream;
use std::path::PathBuf;
use trove_record::Record;

/// Why a run ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop this run. Range exhaustion or `abort()` in a filter.
    Stop,
    /// Stop this run and everything that started it. `terminate()` in a
    /// filter.
    Terminate,
}

/// Progress events emitted by [`Job::run`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. One event per input record.
/// 3. Either [`Complete`](Self::Complete) when the input ran out or
///    [`Stopped`](Self::Stopped) when a predicate ended the run. Records after
///    a stop are never pulled from the input.
///
/// A record that fails produces [`Failed`](Self::Failed) and the run moves on
/// to the next one.
#[derive(Debug)]
pub enum JobEvent {
    Started,
    /// Within the configured `offset`. Nothing was evaluated.
    Skipped { url: String },
    /// Rejected by a predicate.
    Filtered { url: String },
    /// Found in the download archive.
    Archived { url: String },
    /// The destination already exists and `skip` is enabled.
    Exists { url: String, path: PathBuf },
    Downloaded { url: String, path: PathBuf },
    /// The fetcher discarded the content.
    Rejected { url: String },
    Failed { url: String, error: Error },
    Stopped(Signal),
    Complete,
}

impl Job {
    /// Streams a [`JobEvent`] for every `(url, record)` pair in `records`,
    /// handling them one at a time in order.
    pub fn run<'a, S, F>(&'a mut self, records: S, fetcher: &'a F) -> impl Stream<Item = JobEvent> + 'a
    where
        S: Stream<Item = (String, Record)> + 'a,
        F: Fetcher + ?Sized,
    {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield JobEvent::Started;
            let mut position: u64 = 0;
            for await (url, record) in records {
                position += 1;
                if position <= self.offset() {
                    yield JobEvent::Skipped { url };
                    continue;
                }
                let event = self.handle(url, record, fetcher).await;
                if let JobEvent::Stopped(signal) = event {
                    tracing::info!(?signal, position, "run stopped");
                    yield event;
                    return;
                }
                yield event;
            }
            yield JobEvent::Complete;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fetch::{MockFetcher, TextFetcher};
    use futures::StreamExt;
    use futures::stream;
    use std::path::Path;
    use trove_archive::DownloadArchive;
    use trove_config::{OutputConfig, Skip, TemplateConfig};
    use trove_format::TemplateCache;

    fn config(base: &Path) -> OutputConfig {
        OutputConfig {
            filename: Some(TemplateConfig::Plain("{id}.{extension}".to_string())),
            directory: Some(TemplateConfig::Plain(vec!["{category}".to_string()])),
            base_directory: Some(base.to_string_lossy().into_owned()),
            ..OutputConfig::default()
        }
    }

    fn record(id: i64) -> (String, Record) {
        let record = Record::new().with("category", "site").with("id", id).with("extension", "jpeg");
        (format!("https://example.com/{id}.jpg"), record)
    }

    fn fetcher(ids: impl IntoIterator<Item = i64>) -> MockFetcher {
        MockFetcher::with_files(ids.into_iter().map(|id| (format!("https://example.com/{id}.jpg"), format!("image {id}"))))
    }

    async fn run<F: Fetcher>(job: &mut Job, records: Vec<(String, Record)>, fetcher: &F) -> Vec<JobEvent> {
        job.run(stream::iter(records), fetcher).collect().await
    }

    /// A compact form of each event for comparisons.
    fn summary(events: &[JobEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| match event {
                JobEvent::Started => "started".to_string(),
                JobEvent::Skipped { .. } => "skipped".to_string(),
                JobEvent::Filtered { .. } => "filtered".to_string(),
                JobEvent::Archived { .. } => "archived".to_string(),
                JobEvent::Exists { path, .. } => format!("exists {}", file_name(path)),
                JobEvent::Downloaded { path, .. } => format!("downloaded {}", file_name(path)),
                JobEvent::Rejected { .. } => "rejected".to_string(),
                JobEvent::Failed { .. } => "failed".to_string(),
                JobEvent::Stopped(signal) => format!("stopped {signal:?}"),
                JobEvent::Complete => "complete".to_string(),
            })
            .collect()
    }

    fn file_name(path: &Path) -> String {
        path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_downloads_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Job::new(&config(dir.path()), &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1), record(2)], &fetcher([1, 2])).await;
        assert_eq!(summary(&events), ["started", "downloaded 1.jpg", "downloaded 2.jpg", "complete"]);
        let content = std::fs::read_to_string(dir.path().join("site").join("2.jpg")).unwrap();
        assert_eq!(content, "image 2");
        assert!(!dir.path().join("site").join("2.jpg.part").exists());
    }

    #[tokio::test]
    async fn test_offset_skips_leading_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig { offset: 2, ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1), record(2), record(3)], &fetcher([1, 2, 3])).await;
        assert_eq!(summary(&events), ["started", "skipped", "skipped", "downloaded 3.jpg", "complete"]);
    }

    #[tokio::test]
    async fn test_range_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig { image_range: Some("2".to_string()), ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1), record(2), record(3), record(4)], &fetcher([1, 2, 3, 4])).await;
        assert_eq!(summary(&events), ["started", "filtered", "downloaded 2.jpg", "stopped Stop"]);
        assert!(!dir.path().join("site").join("3.jpg").exists());
    }

    #[rstest::rstest]
    #[case("id != 2", &["started", "downloaded 1.jpg", "filtered", "downloaded 3.jpg", "complete"])]
    #[case("missing > 1", &["started", "failed", "failed", "failed", "complete"])]
    #[case("id < 2 or abort()", &["started", "downloaded 1.jpg", "stopped Stop"])]
    #[case("terminate()", &["started", "stopped Terminate"])]
    #[tokio::test]
    async fn test_filter(#[case] filter: &str, #[case] expected: &[&str]) {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig { image_filter: Some(filter.to_string()), ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1), record(2), record(3)], &fetcher([1, 2, 3])).await;
        assert_eq!(summary(&events), expected);
    }

    #[tokio::test]
    async fn test_filter_failure_is_a_filter_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig { image_filter: Some("missing > 1".to_string()), ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1)], &fetcher([1])).await;
        let Some(JobEvent::Failed { error, .. }) = events.get(1) else {
            panic!("expected a failure, got {events:?}");
        };
        assert!(matches!(&**error, ErrorKind::Filter));
    }

    #[tokio::test]
    async fn test_unique() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig { image_unique: true, ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1), record(1)], &fetcher([1])).await;
        assert_eq!(summary(&events), ["started", "downloaded 1.jpg", "filtered", "complete"]);
    }

    #[tokio::test]
    async fn test_archive_skips_known_items() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TemplateCache::new();
        let keygen = DownloadArchive::keygen(&cache, "site", "{id}").unwrap();
        let archive = DownloadArchive::open_in_memory(keygen).await.unwrap();
        let mut job = Job::new(&config(dir.path()), &cache).await.unwrap().with_archive(archive);

        let events = run(&mut job, vec![record(1)], &fetcher([1])).await;
        assert_eq!(summary(&events), ["started", "downloaded 1.jpg", "complete"]);
        std::fs::remove_file(dir.path().join("site").join("1.jpg")).unwrap();

        let events = run(&mut job, vec![record(1), record(2)], &fetcher([1, 2])).await;
        assert_eq!(summary(&events), ["started", "archived", "downloaded 2.jpg", "complete"]);
        assert_eq!(job.archive().unwrap().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_archive_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.sqlite3");
        let config = OutputConfig { archive: Some(path.to_string_lossy().into_owned()), ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        run(&mut job, vec![record(1)], &fetcher([1])).await;
        assert!(path.exists());
        assert_eq!(job.archive().unwrap().len().await.unwrap(), 1);
    }

    #[rstest::rstest]
    #[case(None, &["started", "downloaded 1.jpg", "downloaded 1.jpg", "complete"], 2)]
    #[case(Some(""), &["started", "downloaded 1.jpg", "archived", "complete"], 1)]
    #[tokio::test]
    async fn test_archive_keys_include_category(
        #[case] prefix: Option<&str>,
        #[case] expected: &[&str],
        #[case] entries: u64,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.sqlite3");
        let config = OutputConfig {
            archive: Some(path.to_string_lossy().into_owned()),
            archive_prefix: prefix.map(str::to_string),
            ..config(dir.path())
        };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let records = ["alpha", "beta"]
            .map(|category| {
                let record = Record::new().with("category", category).with("id", 1).with("extension", "jpeg");
                (format!("https://{category}.example.com/1.jpg"), record)
            })
            .to_vec();
        let fetcher = MockFetcher::with_files([
            ("https://alpha.example.com/1.jpg", "alpha 1"),
            ("https://beta.example.com/1.jpg", "beta 1"),
        ]);
        let events = run(&mut job, records, &fetcher).await;
        assert_eq!(summary(&events), expected);
        assert_eq!(job.archive().unwrap().len().await.unwrap(), entries);
        assert!(dir.path().join("alpha").join("1.jpg").exists());
    }

    #[rstest::rstest]
    #[case(Skip::Skip, "exists 1.jpg", "old")]
    #[case(Skip::Overwrite, "downloaded 1.jpg", "image 1")]
    #[case(Skip::Enumerate, "downloaded 1.1.jpg", "old")]
    #[tokio::test]
    async fn test_existing_file(#[case] skip: Skip, #[case] expected: &str, #[case] original: &str) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("site")).unwrap();
        std::fs::write(dir.path().join("site").join("1.jpg"), "old").unwrap();
        let config = OutputConfig { skip, ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1)], &fetcher([1])).await;
        assert_eq!(summary(&events), ["started", expected, "complete"]);
        let content = std::fs::read_to_string(dir.path().join("site").join("1.jpg")).unwrap();
        assert_eq!(content, original);
    }

    #[tokio::test]
    async fn test_rejected_content_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Job::new(&config(dir.path()), &TemplateCache::new()).await.unwrap();
        let fetcher = fetcher([1]).rejecting("https://example.com/1.jpg");
        let events = run(&mut job, vec![record(1)], &fetcher).await;
        assert_eq!(summary(&events), ["started", "rejected", "complete"]);
        assert!(!dir.path().join("site").join("1.jpg").exists());
        assert!(!dir.path().join("site").join("1.jpg.part").exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Job::new(&config(dir.path()), &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1), record(2)], &fetcher([2])).await;
        assert_eq!(summary(&events), ["started", "failed", "downloaded 2.jpg", "complete"]);
    }

    #[tokio::test]
    async fn test_part_directory() {
        let dir = tempfile::tempdir().unwrap();
        let parts = dir.path().join("parts");
        let config = OutputConfig { part_directory: Some(parts.to_string_lossy().into_owned()), ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let events = run(&mut job, vec![record(1)], &fetcher([1])).await;
        assert_eq!(summary(&events), ["started", "downloaded 1.jpg", "complete"]);
        assert!(dir.path().join("site").join("1.jpg").exists());
        assert!(!parts.join("1.jpg.part").exists());
    }

    #[rstest::rstest]
    #[case(true)]
    #[case(false)]
    #[tokio::test]
    async fn test_text_without_extension(#[case] part: bool) {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig { part, ..config(dir.path()) };
        let mut job = Job::new(&config, &TemplateCache::new()).await.unwrap();
        let record = Record::new().with("category", "site").with("id", 5);
        let events = run(&mut job, vec![("text:hello".to_string(), record)], &TextFetcher).await;
        assert_eq!(summary(&events), ["started", "downloaded 5", "complete"]);
        let content = std::fs::read_to_string(dir.path().join("site").join("5")).unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_invalid_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            OutputConfig { filename: Some(TemplateConfig::Plain("{id".to_string())), ..config(dir.path()) },
            OutputConfig { image_range: Some("a-b".to_string()), ..config(dir.path()) },
            OutputConfig { image_filter: Some("id >".to_string()), ..config(dir.path()) },
            OutputConfig { archive_format: Some("{".to_string()), archive: Some(":memory:".to_string()), ..config(dir.path()) },
        ];
        for config in cases {
            let err = Job::new(&config, &TemplateCache::new()).await.err().unwrap();
            assert!(matches!(&*err, ErrorKind::Config), "{config:?}");
        }
    }
}
