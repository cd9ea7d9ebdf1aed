//! Conversions (`!x`) and format specs (`:spec`).

use crate::error::{ErrorKind, Result};
use crate::standard::{StandardSpec, format_standard};
use trove_record::{Value, parse_timestamp};

/// A `!x` conversion, applied to the resolved value before its format spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    /// `!l`
    Lower,
    /// `!u`
    Upper,
    /// `!c`: first character upper case, the rest lower case.
    Capitalize,
    /// `!C`: capitalize every whitespace-separated word.
    CapWords,
    /// `!j`
    Json,
    /// `!t`
    Strip,
    /// `!d`: UNIX timestamp to datetime, `None` when unparseable.
    ParseTimestamp,
    /// `!T`: datetime to UNIX timestamp string, empty otherwise.
    ToTimestamp,
    /// `!U`
    Unquote,
    /// `!S`
    Lenient,
    /// `!s`
    Str,
    /// `!r`
    Repr,
    /// `!a`
    Ascii,
}

impl Conversion {
    pub(crate) fn parse(c: char) -> Result<Self> {
        Ok(match c {
            'l' => Self::Lower,
            'u' => Self::Upper,
            'c' => Self::Capitalize,
            'C' => Self::CapWords,
            'j' => Self::Json,
            't' => Self::Strip,
            'd' => Self::ParseTimestamp,
            'T' => Self::ToTimestamp,
            'U' => Self::Unquote,
            'S' => Self::Lenient,
            's' => Self::Str,
            'r' => Self::Repr,
            'a' => Self::Ascii,
            other => exn::bail!(ErrorKind::template(format!("unknown conversion specifier {other:?}"))),
        })
    }

    pub(crate) fn apply(self, value: Value) -> Value {
        match self {
            Self::Lower => Value::from(value.to_string().to_lowercase()),
            Self::Upper => Value::from(value.to_string().to_uppercase()),
            Self::Capitalize => Value::from(capitalize(&value.to_string())),
            Self::CapWords => {
                let words: Vec<String> = value.to_string().split_whitespace().map(capitalize).collect();
                Value::from(words.join(" "))
            },
            Self::Json => Value::from(value.to_json()),
            Self::Strip => Value::from(value.to_string().trim()),
            Self::ParseTimestamp => parse_timestamp(&value).map_or(Value::Null, Value::DateTime),
            Self::ToTimestamp => match value {
                Value::DateTime(dt) => Value::from(dt.assume_utc().unix_timestamp().to_string()),
                _ => Value::from(""),
            },
            Self::Unquote => {
                let raw = value.to_string();
                Value::from(String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned())
            },
            Self::Lenient => Value::from(value.to_lenient_string()),
            Self::Str => Value::from(value.to_string()),
            Self::Repr => Value::from(value.repr()),
            Self::Ascii => Value::from(value.ascii()),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// The part of a field after `:`.
///
/// The extended specs each consume their own `/`-terminated arguments and
/// hand the remainder of the spec to the next formatter, so
/// `L5/x/?-+/+-/` length-checks the output of the optional wrapper.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FormatSpec {
    /// No spec: the value's plain string form.
    Plain,
    /// Width, alignment, precision and type, or a strftime pattern for datetimes.
    Standard { raw: String, parsed: Option<StandardSpec> },
    /// `?before/after/`
    Optional { before: String, after: String, next: Box<FormatSpec> },
    /// `Lmax/replacement/`
    MaxLen { max: i64, replacement: String, next: Box<FormatSpec> },
    /// `Jseparator/`
    Join { separator: String, next: Box<FormatSpec> },
    /// `Rold/new/`
    Replace { old: String, new: String, next: Box<FormatSpec> },
}

impl FormatSpec {
    pub(crate) fn parse(spec: &str) -> Result<Self> {
        let Some(kind) = spec.chars().next() else {
            return Ok(Self::Plain);
        };
        let arguments = &spec[kind.len_utf8()..];
        Ok(match kind {
            '?' => {
                let (before, after, rest) = two_arguments(arguments, kind)?;
                Self::Optional { before, after, next: Box::new(Self::parse(rest)?) }
            },
            'L' => {
                let (max, replacement, rest) = two_arguments(arguments, kind)?;
                let max = Value::from(max).parse_int().unwrap_or(0);
                Self::MaxLen { max, replacement, next: Box::new(Self::parse(rest)?) }
            },
            'J' => {
                let (separator, rest) = arguments.split_once('/').unwrap_or((arguments, ""));
                Self::Join { separator: separator.to_string(), next: Box::new(Self::parse(rest)?) }
            },
            'R' => {
                let (old, new, rest) = two_arguments(arguments, kind)?;
                Self::Replace { old, new, next: Box::new(Self::parse(rest)?) }
            },
            _ => Self::Standard { raw: spec.to_string(), parsed: StandardSpec::parse(spec) },
        })
    }

    pub(crate) fn apply(&self, value: &Value) -> String {
        match self {
            Self::Plain => value.to_string(),
            Self::Standard { raw, parsed } => format_standard(value, raw, parsed.as_ref()),
            Self::Optional { before, after, next } => {
                if value.is_truthy() {
                    format!("{before}{}{after}", next.apply(value))
                } else {
                    String::new()
                }
            },
            Self::MaxLen { max, replacement, next } => {
                let out = next.apply(value);
                let len = i64::try_from(out.chars().count()).unwrap_or(i64::MAX);
                if len <= *max { out } else { replacement.clone() }
            },
            Self::Join { separator, next } => {
                let joined = match value {
                    Value::List(items) => items.iter().map(ToString::to_string).collect::<Vec<_>>().join(separator),
                    Value::String(s) => s.chars().map(String::from).collect::<Vec<_>>().join(separator),
                    other => other.to_string(),
                };
                next.apply(&Value::String(joined))
            },
            Self::Replace { old, new, next } => {
                let replaced = match value {
                    Value::String(s) => s.replace(old.as_str(), new),
                    other => other.to_string().replace(old.as_str(), new),
                };
                next.apply(&Value::String(replaced))
            },
        }
    }
}

fn two_arguments(arguments: &str, kind: char) -> Result<(String, String, &str)> {
    let mut parts = arguments.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), Some(rest)) => Ok((first.to_string(), second.to_string(), rest)),
        _ => exn::bail!(ErrorKind::template(format!("format spec '{kind}' requires two '/'-terminated arguments"))),
    }
}
