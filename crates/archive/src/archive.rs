use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;
use trove_format::{Formatter, TemplateCache};
use trove_record::{Record, Value};

/// Record field the archive key is cached in between `check` and `add`.
pub const ARCHIVE_KEY: &str = "_archive_key";
pub const DEFAULT_ARCHIVE_FORMAT: &str = "{id}";
/// Keeps items from different sites apart when they share an id.
pub const DEFAULT_ARCHIVE_PREFIX: &str = "{category}";

// Several processes may share one archive file and each holds the write lock
// only for a single insert.
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_CONNECTIONS: u32 = 5;

/// Durable set of keys identifying downloaded items.
///
/// Keys are rendered from each record with the archive's key template.
/// Entries are only ever added.
#[derive(Debug, Clone)]
pub struct DownloadArchive {
    pool: SqlitePool,
    keygen: Formatter,
}

impl DownloadArchive {
    async fn new(options: SqliteConnectOptions, max: u32, keygen: Formatter) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/create_table.sql"))
            .execute(&pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { pool, keygen })
    }

    /// Compiles the key template, `prefix` followed by `format`.
    pub fn keygen(cache: &TemplateCache, prefix: &str, format: &str) -> Result<Formatter> {
        let template = format!("{prefix}{format}");
        Formatter::new(cache, &template, Value::Null).or_raise(|| ErrorKind::KeyFormat(template.clone()))
    }

    /// Opens the archive file at `path`, creating it if it doesn't exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, keygen: Formatter) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, MAX_CONNECTIONS, keygen).await
    }

    /// An archive that only lives as long as this value.
    ///
    /// Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn open_in_memory(keygen: Formatter) -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Every connection to ":memory:" is its own database.
        Self::new(options, 1, keygen).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
    }

    pub fn key(&self, record: &Record) -> String {
        self.keygen.format(record)
    }

    /// Whether the record was downloaded before. The key is stored in the
    /// record under [`ARCHIVE_KEY`] for the following [`add`](Self::add).
    #[instrument(skip_all)]
    pub async fn check(&self, record: &mut Record) -> Result<bool> {
        let key = self.key(record);
        let found: bool = sqlx::query_scalar(include_str!("../queries/contains.sql"))
            .bind(&key)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::trace!(%key, found, "checked archive");
        record.insert(ARCHIVE_KEY, key);
        Ok(found)
    }

    /// Adds the record's key. Adding a key twice is not an error.
    #[instrument(skip_all)]
    pub async fn add(&self, record: &Record) -> Result<()> {
        let key = match record.get_str(ARCHIVE_KEY) {
            Some(key) => key.to_string(),
            None => self.key(record),
        };
        sqlx::query(include_str!("../queries/insert.sql"))
            .bind(&key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(%key, "added to archive");
        Ok(())
    }

    /// Number of keys in the archive.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn keygen(prefix: &str, format: &str) -> Formatter {
        DownloadArchive::keygen(&TemplateCache::new(), prefix, format).unwrap()
    }

    #[tokio::test]
    async fn test_check_then_add() {
        let archive = DownloadArchive::open_in_memory(keygen("site", DEFAULT_ARCHIVE_FORMAT)).await.unwrap();
        let mut record = Record::new().with("id", 42);
        assert!(!archive.check(&mut record).await.unwrap());
        assert_eq!(record.get_str(ARCHIVE_KEY), Some("site42"));
        archive.add(&record).await.unwrap();
        let mut again = Record::new().with("id", 42);
        assert!(archive.check(&mut again).await.unwrap());
        archive.close().await;
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let archive = DownloadArchive::open_in_memory(keygen("", "{id}_{num}")).await.unwrap();
        let record = Record::new().with("id", 1).with("num", 2);
        archive.add(&record).await.unwrap();
        archive.add(&record).await.unwrap();
        assert_eq!(archive.len().await.unwrap(), 1);
        archive.close().await;
    }

    #[tokio::test]
    async fn test_add_uses_cached_key() {
        let archive = DownloadArchive::open_in_memory(keygen("", "{id}")).await.unwrap();
        let mut record = Record::new().with("id", 1);
        archive.check(&mut record).await.unwrap();
        record.insert("id", 2);
        archive.add(&record).await.unwrap();
        assert!(archive.check(&mut Record::new().with("id", 1)).await.unwrap());
        assert!(!archive.check(&mut Record::new().with("id", 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.sqlite3");
        let archive = DownloadArchive::open(&path, keygen("", "{id}")).await.unwrap();
        assert!(archive.is_empty().await.unwrap());
        archive.add(&Record::new().with("id", 7)).await.unwrap();
        archive.close().await;

        let archive = DownloadArchive::open(&path, keygen("", "{id}")).await.unwrap();
        assert_eq!(archive.len().await.unwrap(), 1);
        assert!(archive.check(&mut Record::new().with("id", 7)).await.unwrap());
        archive.close().await;
    }

    #[rstest]
    #[case("", "{id")]
    #[case("}", "{id}")]
    fn test_invalid_key_format(#[case] prefix: &str, #[case] format: &str) {
        let err = DownloadArchive::keygen(&TemplateCache::new(), prefix, format).unwrap_err();
        assert!(matches!(&*err, ErrorKind::KeyFormat(_)));
    }
}
