use crate::error::{ErrorKind, Result};
use crate::format::PathFormat;
use exn::OptionExt;
use std::path::{MAIN_SEPARATOR, Path};
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tokio::fs;
use tracing::instrument;
use trove_record::{Record, Value};

/// Upper bound on the numeric prefixes [`PathState::enum_file`] tries.
pub const MAX_ENUMERATION: usize = 10_000;

/// Suffix of files still being written.
pub const PART_SUFFIX: &str = ".part";

/// Where one record ends up on disk.
///
/// Populate with [`set_directory`](Self::set_directory) then
/// [`set_filename`](Self::set_filename). Bytes go to
/// [`temppath`](Self::temppath) through [`open`](Self::open), and
/// [`finalize`](Self::finalize) moves them to [`realpath`](Self::realpath).
///
/// `path` is what users see. `realpath` is what the filesystem gets: on
/// Windows it is the absolute, `\\?\`-prefixed form, elsewhere it is the same
/// as `path`.
#[derive(Debug)]
pub struct PathState {
    format: Arc<PathFormat>,
    record: Record,
    directory: String,
    real_directory: String,
    filename: String,
    extension: String,
    prefix: String,
    path: String,
    realpath: String,
    temppath: String,
    delete: bool,
    create_directory: bool,
}

impl PathState {
    pub(crate) fn new(format: Arc<PathFormat>) -> Self {
        Self {
            format,
            record: Record::new(),
            directory: String::new(),
            real_directory: String::new(),
            filename: String::new(),
            extension: String::new(),
            prefix: String::new(),
            path: String::new(),
            realpath: String::new(),
            temppath: String::new(),
            delete: false,
            create_directory: false,
        }
    }

    /// The record as last seen, with `extension` rewritten to what the
    /// filename was built from.
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Empty, or `"<n>."` after [`enum_file`](Self::enum_file).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn realpath(&self) -> &Path {
        Path::new(&self.realpath)
    }

    pub fn temppath(&self) -> &Path {
        Path::new(&self.temppath)
    }

    /// Discard the temporary file instead of keeping it on
    /// [`finalize`](Self::finalize).
    pub fn mark_delete(&mut self) {
        self.delete = true;
    }

    pub fn is_marked_delete(&self) -> bool {
        self.delete
    }

    /// Builds the directory. It is created on first use.
    pub fn set_directory(&mut self, record: &Record) -> Result<()> {
        self.record = record.clone();
        let segments = self.format.build_directory(record)?;
        self.directory = self.format.join_directory(&segments);
        self.real_directory = real_directory(&self.directory);
        self.create_directory = true;
        Ok(())
    }

    /// Maps the record's `extension` and builds the filename. A record
    /// without an extension leaves the filename empty until
    /// [`set_extension`](Self::set_extension) or
    /// [`fix_extension`](Self::fix_extension).
    pub fn set_filename(&mut self, record: &Record) -> Result<()> {
        self.record = record.clone();
        self.temppath.clear();
        self.prefix.clear();
        let extension = match record.get("extension") {
            None | Some(Value::Null) => String::new(),
            Some(value) => value.to_string(),
        };
        self.extension = self.format.map_extension(&extension);
        self.record.insert("extension", self.extension.clone());
        match self.extension.is_empty() {
            true => self.filename.clear(),
            false => self.build_path()?,
        }
        Ok(())
    }

    /// Rebuilds the filename with a new extension. With `real` unset the
    /// state keeps its current extension and only the name changes, which is
    /// how prefixes and `.part` names are produced.
    pub fn set_extension(&mut self, extension: &str, real: bool) -> Result<()> {
        let extension = self.format.map_extension(extension);
        self.record.insert("extension", format!("{}{extension}", self.prefix));
        if real {
            self.extension = extension;
        }
        self.build_path()
    }

    /// Gives a file without an extension a name that doesn't end in a dot.
    pub fn fix_extension(&mut self) -> Result<()> {
        if !self.extension.is_empty() {
            return Ok(());
        }
        self.set_extension("", false)?;
        if self.path.ends_with('.') {
            self.path.pop();
            if self.temppath == self.realpath {
                self.temppath.pop();
            }
            self.realpath.pop();
        }
        Ok(())
    }

    pub fn build_path(&mut self) -> Result<()> {
        self.filename = self.format.build_filename(&self.record)?;
        self.path = format!("{}{}", self.directory, self.filename);
        self.realpath = format!("{}{}", self.real_directory, self.filename);
        if self.temppath.is_empty() {
            self.temppath = self.realpath.clone();
        }
        Ok(())
    }

    /// Writes go to a `.part` file, optionally kept in `part_directory`.
    pub fn part_enable(&mut self, part_directory: Option<&Path>) -> Result<()> {
        match self.extension.is_empty() {
            true => self.set_extension("part", false)?,
            false => self.temppath.push_str(PART_SUFFIX),
        }
        if let Some(part_directory) = part_directory {
            let name =
                Path::new(&self.temppath).file_name().ok_or_raise(|| ErrorKind::Io(not_found(&self.temppath)))?;
            self.temppath = part_directory.join(name).to_string_lossy().into_owned();
        }
        Ok(())
    }

    /// Bytes written to the temporary file so far, zero if there is none.
    pub async fn part_size(&self) -> u64 {
        fs::metadata(&self.temppath).await.map(|metadata| metadata.len()).unwrap_or(0)
    }

    /// Whether the final file is already on disk.
    pub async fn exists(&self) -> bool {
        !self.extension.is_empty() && fs::try_exists(&self.realpath).await.unwrap_or(false)
    }

    /// Puts `1.`, `2.`, ... in front of the extension until the name is free.
    #[instrument(skip_all, fields(path = %self.path))]
    pub async fn enum_file(&mut self) -> Result<()> {
        let follows_realpath = self.temppath == self.realpath;
        let extension = self.extension.clone();
        for num in 1..=MAX_ENUMERATION {
            self.prefix = format!("{num}.");
            self.set_extension(&extension, false)?;
            if follows_realpath {
                self.temppath = self.realpath.clone();
            }
            if !fs::try_exists(&self.realpath).await.unwrap_or(false) {
                tracing::debug!(path = %self.path, "enumerated free file name");
                return Ok(());
            }
        }
        exn::bail!(ErrorKind::Enumeration(self.realpath().to_path_buf()))
    }

    async fn create_directories(&mut self) -> Result<()> {
        if self.create_directory {
            fs::create_dir_all(&self.real_directory).await.map_err(ErrorKind::Io)?;
            self.create_directory = false;
        }
        if let Some(parent) = Path::new(&self.temppath).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        Ok(())
    }

    /// Creates missing directories and opens the temporary file for writing,
    /// truncating anything already there.
    pub async fn open(&mut self) -> Result<fs::File> {
        self.create_directories().await?;
        Ok(fs::File::create(&self.temppath).await.map_err(ErrorKind::Io)?)
    }

    /// Opens the temporary file for appending, for resuming a partial download.
    pub async fn open_append(&mut self) -> Result<fs::File> {
        self.create_directories().await?;
        let file = fs::OpenOptions::new().create(true).append(true).open(&self.temppath).await;
        Ok(file.map_err(ErrorKind::Io)?)
    }

    /// Moves the temporary file into place, or removes it if the state was
    /// marked for deletion (a temporary file that was never written is fine).
    /// Then applies `_mtime`, ignoring failures.
    #[instrument(skip_all, fields(path = %self.path))]
    pub async fn finalize(&mut self) -> Result<()> {
        if self.delete {
            self.delete = false;
            tracing::debug!(temppath = %self.temppath, "discarding rejected file");
            if let Err(err) = fs::remove_file(&self.temppath).await
                && err.kind() != std::io::ErrorKind::NotFound
            {
                exn::bail!(ErrorKind::Io(err));
            }
            return Ok(());
        }
        if self.temppath != self.realpath {
            self.create_directories().await?;
            if let Err(err) = fs::rename(&self.temppath, &self.realpath).await {
                tracing::debug!(error = %err, "rename failed, copying instead");
                fs::copy(&self.temppath, &self.realpath).await.map_err(ErrorKind::Io)?;
                fs::remove_file(&self.temppath).await.map_err(ErrorKind::Io)?;
            }
        }
        if self.format.sets_mtime()
            && let Some(mtime) = self.record.get("_mtime").filter(|mtime| mtime.is_truthy())
            && let Err(err) = set_mtime(self.realpath(), mtime).await
        {
            tracing::warn!(error = ?err, "unable to set file modification time");
        }
        Ok(())
    }
}

fn not_found(path: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, format!("no file name in {path:?}"))
}

#[cfg(windows)]
fn real_directory(directory: &str) -> String {
    let absolute = std::path::absolute(directory).map(|path| path.to_string_lossy().into_owned());
    let mut real = format!(r"\\?\{}", absolute.unwrap_or_else(|_| directory.to_string()));
    if !real.ends_with(MAIN_SEPARATOR) {
        real.push(MAIN_SEPARATOR);
    }
    real
}

#[cfg(not(windows))]
fn real_directory(directory: &str) -> String {
    debug_assert!(directory.is_empty() || directory.ends_with(MAIN_SEPARATOR));
    directory.to_string()
}

/// Integers and floats are UNIX timestamps, strings are RFC 2822 dates.
fn mtime_of(value: &Value) -> Result<SystemTime> {
    let invalid = || ErrorKind::Mtime(value.to_string());
    let datetime = match value {
        Value::Int(seconds) => OffsetDateTime::from_unix_timestamp(*seconds).ok(),
        Value::Float(seconds) if seconds.is_finite() => {
            OffsetDateTime::from_unix_timestamp_nanos((seconds * 1e9) as i128).ok()
        },
        Value::String(date) => OffsetDateTime::parse(date.trim(), &Rfc2822).ok(),
        Value::DateTime(datetime) => Some(datetime.assume_utc()),
        _ => None,
    };
    Ok(SystemTime::from(datetime.ok_or_raise(invalid)?))
}

async fn set_mtime(path: &Path, value: &Value) -> Result<()> {
    let mtime = mtime_of(value)?;
    let file = fs::OpenOptions::new().write(true).open(path).await.map_err(ErrorKind::Io)?;
    file.into_std().await.set_modified(mtime).map_err(ErrorKind::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{PathOptions, Template};
    use rstest::rstest;
    use std::path::PathBuf;
    use tokio::io::AsyncWriteExt;
    use trove_format::TemplateCache;

    fn format(base: &Path) -> Arc<PathFormat> {
        let options = PathOptions {
            filename: Template::Plain("{title}.{extension}".to_string()),
            directory: Template::Plain(vec!["{category}".to_string()]),
            base_directory: Some(base.to_string_lossy().into_owned()),
            ..PathOptions::default()
        };
        Arc::new(PathFormat::new(&options, &TemplateCache::new()).unwrap())
    }

    fn record() -> Record {
        Record::new().with("category", "site").with("title", "cat").with("extension", "jpeg")
    }

    fn state(base: &Path, record: &Record) -> PathState {
        let mut state = format(base).state();
        state.set_directory(record).unwrap();
        state.set_filename(record).unwrap();
        state
    }

    async fn write(state: &mut PathState, data: &[u8]) {
        let mut file = state.open().await.unwrap();
        file.write_all(data).await.unwrap();
        file.flush().await.unwrap();
    }

    #[test]
    fn test_set_filename_maps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), &record());
        assert_eq!(state.extension(), "jpg");
        assert_eq!(state.filename(), "cat.jpg");
        assert_eq!(state.record().get_str("extension"), Some("jpg"));
        assert_eq!(state.realpath(), dir.path().join("site").join("cat.jpg"));
        assert_eq!(state.temppath(), state.realpath());
    }

    #[test]
    fn test_missing_extension_leaves_filename_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = record();
        record.remove("extension");
        let mut state = state(dir.path(), &record);
        assert_eq!(state.filename(), "");
        state.fix_extension().unwrap();
        assert_eq!(state.filename(), "cat.");
        assert!(state.path().ends_with("cat"));
        assert_eq!(state.realpath(), dir.path().join("site").join("cat"));
        assert_eq!(state.temppath(), state.realpath());
    }

    #[test]
    fn test_set_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path(), &record());
        state.set_extension("png", true).unwrap();
        assert_eq!(state.extension(), "png");
        assert_eq!(state.filename(), "cat.png");
        state.set_extension("webp", false).unwrap();
        assert_eq!(state.extension(), "png");
        assert_eq!(state.filename(), "cat.webp");
    }

    #[rstest]
    #[case(None)]
    #[case(Some("parts"))]
    fn test_part_enable(#[case] part_directory: Option<&str>) {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path(), &record());
        let part_directory = part_directory.map(|name| dir.path().join(name));
        state.part_enable(part_directory.as_deref()).unwrap();
        let expected = match part_directory {
            Some(part_directory) => part_directory.join("cat.jpg.part"),
            None => dir.path().join("site").join("cat.jpg.part"),
        };
        assert_eq!(state.temppath(), expected);
        assert_eq!(state.realpath(), dir.path().join("site").join("cat.jpg"));
    }

    #[test]
    fn test_part_enable_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = record();
        record.remove("extension");
        let mut state = state(dir.path(), &record);
        state.part_enable(None).unwrap();
        assert_eq!(state.temppath(), dir.path().join("site").join("cat.part"));
        assert_eq!(state.extension(), "");
    }

    #[test]
    fn test_fix_extension_keeps_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = record();
        record.remove("extension");
        let mut state = state(dir.path(), &record);
        state.part_enable(None).unwrap();
        state.fix_extension().unwrap();
        assert_eq!(state.temppath(), dir.path().join("site").join("cat.part"));
        assert_eq!(state.realpath(), dir.path().join("site").join("cat"));
    }

    #[tokio::test]
    async fn test_open_and_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path(), &record());
        state.part_enable(None).unwrap();
        assert!(!state.exists().await);
        write(&mut state, b"meow").await;
        assert_eq!(state.part_size().await, 4);
        assert!(!state.exists().await);
        state.finalize().await.unwrap();
        assert!(state.exists().await);
        assert!(!state.temppath().exists());
        assert_eq!(std::fs::read(state.realpath()).unwrap(), b"meow");
    }

    #[tokio::test]
    async fn test_finalize_from_part_directory() {
        let dir = tempfile::tempdir().unwrap();
        let parts = dir.path().join("parts");
        let mut state = state(dir.path(), &record());
        state.part_enable(Some(&parts)).unwrap();
        write(&mut state, b"data").await;
        assert!(parts.join("cat.jpg.part").exists());
        state.finalize().await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("site/cat.jpg")).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_finalize_deletes_rejected_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path(), &record());
        state.part_enable(None).unwrap();
        write(&mut state, b"junk").await;
        state.mark_delete();
        state.finalize().await.unwrap();
        assert!(!state.temppath().exists());
        assert!(!state.realpath().exists());
        assert!(!state.is_marked_delete());
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_only_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state(dir.path(), &record());
        state.part_enable(None).unwrap();
        write(&mut state, b"half").await;
        drop(state);
        let site = dir.path().join("site");
        assert!(site.join("cat.jpg.part").exists());
        assert!(!site.join("cat.jpg").exists());
    }

    #[tokio::test]
    async fn test_enum_file() {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("site");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(site.join("cat.jpg"), b"").unwrap();
        // the prefix travels in `{extension}`
        std::fs::write(site.join("cat.1.jpg"), b"").unwrap();
        let mut state = state(dir.path(), &record());
        assert!(state.exists().await);
        state.enum_file().await.unwrap();
        assert_eq!(state.prefix(), "2.");
        assert_eq!(state.filename(), "cat.2.jpg");
        assert_eq!(state.temppath(), state.realpath());
        assert!(!state.exists().await);
    }

    #[tokio::test]
    async fn test_enum_file_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let options = PathOptions {
            filename: Template::Plain("fixed".to_string()),
            directory: Template::Plain(vec![]),
            base_directory: Some(dir.path().to_string_lossy().into_owned()),
            ..PathOptions::default()
        };
        std::fs::write(dir.path().join("fixed"), b"").unwrap();
        let mut state = Arc::new(PathFormat::new(&options, &TemplateCache::new()).unwrap()).state();
        state.set_directory(&record()).unwrap();
        state.set_filename(&record()).unwrap();
        let err = state.enum_file().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Enumeration(_)));
    }

    #[tokio::test]
    async fn test_finalize_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let record = record().with("_mtime", 1_600_000_000);
        let mut state = state(dir.path(), &record);
        write(&mut state, b"x").await;
        state.finalize().await.unwrap();
        let modified = std::fs::metadata(state.realpath()).unwrap().modified().unwrap();
        let expected = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        assert_eq!(modified, expected);
    }

    #[tokio::test]
    async fn test_invalid_mtime_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let record = record().with("_mtime", "not a date");
        let mut state = state(dir.path(), &record);
        write(&mut state, b"x").await;
        state.finalize().await.unwrap();
        assert!(state.realpath().exists());
    }

    #[rstest]
    #[case(Value::Int(0), Some(0))]
    #[case(Value::Float(1.5), Some(1))]
    #[case(Value::from("Sun, 13 Sep 2020 12:26:40 +0000"), Some(1_600_000_000))]
    #[case(Value::from("yesterday"), None)]
    #[case(Value::from(vec![1]), None)]
    fn test_mtime_of(#[case] value: Value, #[case] expected: Option<u64>) {
        let seconds = mtime_of(&value)
            .ok()
            .map(|time| time.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs());
        assert_eq!(seconds, expected);
    }

    #[test]
    fn test_directory_is_not_created_eagerly() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), &record());
        assert!(!PathBuf::from(state.directory()).exists());
    }
}
