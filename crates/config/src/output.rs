use crate::error::{ErrorKind, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use trove_path::{PathOptions, Restrict, Strip, Template};
use trove_record::Value;

/// A template given either as-is or keyed by condition expressions.
///
/// As a list of `[condition, template]` pairs, conditions are tried in the
/// order written. A map may hold at most one condition besides the empty
/// one, since maps don't keep their order. The empty condition is the
/// fallback in both forms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TemplateConfig<T> {
    Plain(T),
    Ordered(Vec<(String, T)>),
    Conditional(BTreeMap<String, T>),
}

impl<T> TemplateConfig<T> {
    fn check(&self, option: &str) -> Result<()> {
        if let Self::Conditional(map) = self {
            let conditions = map.keys().filter(|condition| !condition.is_empty()).count();
            if conditions > 1 {
                exn::bail!(ErrorKind::InvalidOption(format!(
                    "{option} has {conditions} conditions in a map, list them as [condition, template] pairs instead"
                )));
            }
        }
        Ok(())
    }
}

impl<T> From<TemplateConfig<T>> for Template<T> {
    fn from(config: TemplateConfig<T>) -> Self {
        match config {
            TemplateConfig::Plain(template) => Template::Plain(template),
            TemplateConfig::Ordered(pairs) => Template::Conditional(pairs),
            TemplateConfig::Conditional(map) => Template::Conditional(map.into_iter().collect()),
        }
    }
}

/// `path-restrict`: a preset name or character class, or a map from single
/// characters to their replacements.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RestrictConfig {
    Preset(String),
    Map(BTreeMap<String, String>),
}

impl Default for RestrictConfig {
    fn default() -> Self {
        Self::Preset("auto".to_string())
    }
}

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SkipValue")]
pub enum Skip {
    /// `true`: leave the file alone and record the item in the archive.
    #[default]
    Skip,
    /// `false`: download again over the existing file.
    Overwrite,
    /// `"enumerate"`: pick the next free `N.` prefixed name.
    Enumerate,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SkipValue {
    Flag(bool),
    Mode(String),
}

impl TryFrom<SkipValue> for Skip {
    type Error = String;

    fn try_from(value: SkipValue) -> std::result::Result<Self, Self::Error> {
        match value {
            SkipValue::Flag(true) => Ok(Self::Skip),
            SkipValue::Flag(false) => Ok(Self::Overwrite),
            SkipValue::Mode(mode) if mode == "enumerate" => Ok(Self::Enumerate),
            SkipValue::Mode(mode) => Err(format!("unknown skip mode {mode:?}")),
        }
    }
}

/// Options for turning records into files on disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    pub filename: Option<TemplateConfig<String>>,
    pub directory: Option<TemplateConfig<Vec<String>>>,
    pub keywords_default: Value,
    pub extension_map: Option<HashMap<String, String>>,
    pub path_restrict: RestrictConfig,
    pub path_replace: String,
    pub path_remove: Option<String>,
    pub path_strip: String,
    pub base_directory: Option<String>,
    /// SQLite file remembering downloaded items. No archive when unset.
    pub archive: Option<String>,
    /// Prepended to `archive-format`. `{category}` when unset.
    pub archive_prefix: Option<String>,
    pub archive_format: Option<String>,
    /// Which items to process by position, e.g. `"1-5,10"`.
    pub image_range: Option<String>,
    /// Expression deciding which items to process.
    pub image_filter: Option<String>,
    /// Skip URLs already seen during this run.
    pub image_unique: bool,
    /// Download into a `.part` file first.
    pub part: bool,
    pub part_directory: Option<String>,
    pub mtime: bool,
    pub skip: Skip,
    /// Number of leading items to ignore entirely.
    pub offset: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            filename: None,
            directory: None,
            keywords_default: Value::Null,
            extension_map: None,
            path_restrict: RestrictConfig::default(),
            path_replace: "_".to_string(),
            path_remove: None,
            path_strip: "auto".to_string(),
            base_directory: None,
            archive: None,
            archive_prefix: None,
            archive_format: None,
            image_range: None,
            image_filter: None,
            image_unique: false,
            part: true,
            part_directory: None,
            mtime: true,
            skip: Skip::default(),
            offset: 0,
        }
    }
}

impl OutputConfig {
    /// The path-related options, with defaults filled in.
    pub fn path_options(&self) -> Result<PathOptions> {
        let defaults = PathOptions::default();
        if let Some(filename) = &self.filename {
            filename.check("filename")?;
        }
        if let Some(directory) = &self.directory {
            directory.check("directory")?;
        }
        let restrict = match &self.path_restrict {
            RestrictConfig::Preset(value) => Restrict::parse(value),
            RestrictConfig::Map(map) => Restrict::Map(
                map.iter()
                    .map(|(key, replacement)| {
                        let mut chars = key.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => Ok((c, replacement.clone())),
                            _ => exn::bail!(ErrorKind::InvalidOption(format!(
                                "path-restrict key {key:?} is not a single character"
                            ))),
                        }
                    })
                    .collect::<Result<_>>()?,
            ),
        };
        Ok(PathOptions {
            filename: self.filename.clone().map(Template::from).unwrap_or(defaults.filename),
            directory: self.directory.clone().map(Template::from).unwrap_or(defaults.directory),
            keywords_default: self.keywords_default.clone(),
            extension_map: self.extension_map.clone(),
            restrict,
            replace: self.path_replace.clone(),
            remove: self.path_remove.clone().unwrap_or(defaults.remove),
            strip: Strip::parse(&self.path_strip),
            base_directory: self.base_directory.clone(),
            mtime: self.mtime,
        })
    }
}
