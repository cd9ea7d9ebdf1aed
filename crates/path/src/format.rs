use crate::clean::Cleaner;
use crate::error::{ErrorKind, Result};
use crate::expand::expand_path;
use crate::options::{DEFAULT_DIRECTORY, DEFAULT_FILENAME, PathOptions, Restrict, Template, default_extension_map};
use crate::state::PathState;
use exn::ResultExt;
use std::collections::HashMap;
use std::path::MAIN_SEPARATOR;
use std::sync::Arc;
use tracing::instrument;
use trove_expr::Expression;
use trove_format::{Formatter, TemplateCache};
use trove_record::Record;

/// Conditional templates: the first condition that holds wins.
#[derive(Debug)]
struct Select<T> {
    conditions: Vec<(Expression, T)>,
    fallback: T,
}

impl<T> Select<T> {
    fn compile<S>(
        template: &Template<S>,
        default: impl FnOnce() -> S,
        compile: impl Fn(&S) -> Result<T>,
        kind: impl Fn(String) -> ErrorKind,
    ) -> Result<Self> {
        match template {
            Template::Plain(source) => Ok(Self { conditions: Vec::new(), fallback: compile(source)? }),
            Template::Conditional(entries) => {
                let mut conditions = Vec::with_capacity(entries.len());
                let mut fallback = None;
                for (condition, source) in entries {
                    if condition.is_empty() {
                        fallback = Some(compile(source)?);
                        continue;
                    }
                    let expression = Expression::compile(condition).or_raise(|| kind(condition.clone()))?;
                    conditions.push((expression, compile(source)?));
                }
                let fallback = match fallback {
                    Some(fallback) => fallback,
                    None => compile(&default())?,
                };
                Ok(Self { conditions, fallback })
            },
        }
    }

    fn pick(&self, record: &Record) -> trove_expr::Result<&T> {
        for (condition, value) in &self.conditions {
            if condition.test(record)? {
                return Ok(value);
            }
        }
        Ok(&self.fallback)
    }
}

/// Compiled path configuration, shared by every record of a run.
///
/// Turns records into sanitized directory and file names. The per-record half
/// lives in [`PathState`], created with [`PathFormat::state`].
#[derive(Debug)]
pub struct PathFormat {
    filename: Select<Formatter>,
    directory: Select<Vec<Formatter>>,
    extension_map: HashMap<String, String>,
    clean_segment: Cleaner,
    clean_path: Cleaner,
    strip: String,
    base_directory: String,
    mtime: bool,
}

impl PathFormat {
    #[instrument(skip_all)]
    pub fn new(options: &PathOptions, cache: &TemplateCache) -> Result<Self> {
        let default = &options.keywords_default;
        let formatter = |source: &String, kind: fn(String) -> ErrorKind| {
            Formatter::new(cache, source, default.clone()).or_raise(|| kind(source.clone()))
        };
        let filename = Select::compile(
            &options.filename,
            || DEFAULT_FILENAME.to_string(),
            |source| formatter(source, ErrorKind::FilenameFormat),
            ErrorKind::FilenameFormat,
        )?;
        let directory = Select::compile(
            &options.directory,
            || vec![DEFAULT_DIRECTORY.to_string()],
            |sources| {
                sources.iter().map(|source| formatter(source, ErrorKind::DirectoryFormat)).collect::<Result<Vec<_>>>()
            },
            ErrorKind::DirectoryFormat,
        )?;
        let clean_segment = match (&options.restrict, options.restrict.chars()) {
            (Restrict::Map(map), _) => Cleaner::map(map),
            (_, Some(chars)) => Cleaner::class(chars, &options.replace)?,
            (_, None) => Cleaner::Identity,
        };
        let clean_path = Cleaner::class(&options.remove, "")?;
        let base_directory = base_directory(options.base_directory.as_deref(), &clean_path);
        tracing::debug!(%base_directory, "compiled path format");
        Ok(Self {
            filename,
            directory,
            extension_map: options.extension_map.clone().unwrap_or_else(default_extension_map),
            clean_segment,
            clean_path,
            strip: options.strip.chars().to_string(),
            base_directory,
            mtime: options.mtime,
        })
    }

    /// Fresh per-record state.
    pub fn state(self: &Arc<Self>) -> PathState {
        PathState::new(Arc::clone(self))
    }

    pub fn base_directory(&self) -> &str {
        &self.base_directory
    }

    pub(crate) fn sets_mtime(&self) -> bool {
        self.mtime
    }

    pub fn map_extension(&self, extension: &str) -> String {
        self.extension_map.get(extension).cloned().unwrap_or_else(|| extension.to_string())
    }

    /// Formats every directory segment. Segments are trimmed, stripped of the
    /// `path-strip` characters, cleaned, and dropped when empty.
    pub fn build_directory(&self, record: &Record) -> Result<Vec<String>> {
        let formatters =
            self.directory.pick(record).or_raise(|| ErrorKind::DirectoryFormat("condition failed".to_string()))?;
        let strip: Vec<char> = self.strip.chars().collect();
        Ok(formatters
            .iter()
            .filter_map(|formatter| {
                let segment = formatter.format(record);
                let segment = segment.trim().trim_end_matches(strip.as_slice());
                (!segment.is_empty()).then(|| self.clean_segment.apply(segment).into_owned())
            })
            .collect())
    }

    /// The base directory joined with the formatted segments, ending in a
    /// separator.
    pub fn join_directory(&self, segments: &[String]) -> String {
        if segments.is_empty() {
            return self.base_directory.clone();
        }
        let sep = MAIN_SEPARATOR.to_string();
        let joined = segments.join(&sep) + &sep;
        format!("{}{}", self.base_directory, self.clean_path.apply(&joined))
    }

    pub fn build_filename(&self, record: &Record) -> Result<String> {
        let formatter =
            self.filename.pick(record).or_raise(|| ErrorKind::FilenameFormat("condition failed".to_string()))?;
        let filename = formatter.format(record);
        Ok(self.clean_path.apply(&self.clean_segment.apply(&filename)).into_owned())
    }
}

fn base_directory(option: Option<&str>, clean_path: &Cleaner) -> String {
    let base = match option {
        None => format!(".{MAIN_SEPARATOR}trove{MAIN_SEPARATOR}"),
        Some("") => String::new(),
        Some(directory) => {
            let mut directory = expand_path(directory);
            if cfg!(windows) {
                directory = directory.replace('/', "\\");
            }
            if !directory.ends_with(MAIN_SEPARATOR) {
                directory.push(MAIN_SEPARATOR);
            }
            directory
        },
    };
    clean_path.apply(&base).into_owned()
}
