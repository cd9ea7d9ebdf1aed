use std::collections::{BTreeMap, HashMap};
use trove_record::Value;

pub const DEFAULT_FILENAME: &str = "{filename}.{extension}";
pub const DEFAULT_DIRECTORY: &str = "{category}";

const WINDOWS_RESTRICT: &str = r#"\\|/<>:"?*"#;
const ASCII_RESTRICT: &str = "^0-9A-Za-z_.";
const DEFAULT_REMOVE: &str = r"\x00-\x1f\x7f";

/// A template, or a list of `(condition, template)` pairs tried in order.
/// The pair with an empty condition is the fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Template<T> {
    Plain(T),
    Conditional(Vec<(String, T)>),
}

/// Characters replaced inside each path segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Restrict {
    /// `windows` on Windows, `unix` elsewhere.
    #[default]
    Auto,
    /// Only `/`.
    Unix,
    /// `\ | / < > : " ? *`
    Windows,
    /// Everything but `0-9A-Za-z_.`
    Ascii,
    /// A regex character class, without the brackets.
    Chars(String),
    /// Per-character replacements. `path-replace` is ignored.
    Map(BTreeMap<char, String>),
}

impl Restrict {
    /// Maps the named presets, treating anything else as a character class.
    pub fn parse(value: &str) -> Self {
        match value {
            "auto" => Self::Auto,
            "unix" => Self::Unix,
            "windows" => Self::Windows,
            "ascii" => Self::Ascii,
            chars => Self::Chars(chars.to_string()),
        }
    }

    pub(crate) fn chars(&self) -> Option<&str> {
        match self {
            Self::Auto if cfg!(windows) => Some(WINDOWS_RESTRICT),
            Self::Auto | Self::Unix => Some("/"),
            Self::Windows => Some(WINDOWS_RESTRICT),
            Self::Ascii => Some(ASCII_RESTRICT),
            Self::Chars(chars) => Some(chars),
            Self::Map(_) => None,
        }
    }
}

/// Characters stripped from the end of each directory segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Strip {
    /// `windows` on Windows, `unix` elsewhere.
    #[default]
    Auto,
    /// Nothing.
    Unix,
    /// Dots and spaces.
    Windows,
    Chars(String),
}

impl Strip {
    pub fn parse(value: &str) -> Self {
        match value {
            "auto" => Self::Auto,
            "unix" => Self::Unix,
            "windows" => Self::Windows,
            chars => Self::Chars(chars.to_string()),
        }
    }

    pub(crate) fn chars(&self) -> &str {
        match self {
            Self::Auto if cfg!(windows) => ". ",
            Self::Auto | Self::Unix => "",
            Self::Windows => ". ",
            Self::Chars(chars) => chars,
        }
    }
}

/// Everything [`PathFormat`](crate::PathFormat) needs to know, with defaults
/// for every option.
#[derive(Debug, Clone, PartialEq)]
pub struct PathOptions {
    pub filename: Template<String>,
    pub directory: Template<Vec<String>>,
    /// Substituted for fields that don't resolve.
    pub keywords_default: Value,
    /// Replaces the built-in `jpeg`/`jpe`/`jfif`/`jif`/`jfi` to `jpg` map.
    pub extension_map: Option<HashMap<String, String>>,
    pub restrict: Restrict,
    pub replace: String,
    /// Character class removed from the whole path.
    pub remove: String,
    pub strip: Strip,
    /// `None` means `./trove/`. An empty string means no base directory.
    pub base_directory: Option<String>,
    /// Apply `_mtime` from the record to finished files.
    pub mtime: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            filename: Template::Plain(DEFAULT_FILENAME.to_string()),
            directory: Template::Plain(vec![DEFAULT_DIRECTORY.to_string()]),
            keywords_default: Value::Null,
            extension_map: None,
            restrict: Restrict::Auto,
            replace: "_".to_string(),
            remove: DEFAULT_REMOVE.to_string(),
            strip: Strip::Auto,
            base_directory: None,
            mtime: true,
        }
    }
}

pub(crate) fn default_extension_map() -> HashMap<String, String> {
    ["jpeg", "jpe", "jfif", "jif", "jfi"].into_iter().map(|ext| (ext.to_string(), "jpg".to_string())).collect()
}
