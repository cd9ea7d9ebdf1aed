//! String renderings of [`Value`]: `str()`, `repr()`, `ascii()` and JSON.

use crate::Value;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult, Write};
use std::io::{self, Write as _};
use time::PrimitiveDateTime;

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::String(s) => f.write_str(s),
            Self::DateTime(dt) => f.write_str(&datetime_str(dt)),
            other => f.write_str(&other.repr()),
        }
    }
}

impl Value {
    /// Unambiguous rendering: strings are quoted, containers recurse.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        write_repr(&mut out, self, false);
        out
    }

    /// Like [`repr`](Self::repr), but every non-ASCII character is escaped.
    pub fn ascii(&self) -> String {
        let mut out = String::new();
        write_repr(&mut out, self, true);
        out
    }

    /// Best-effort stringification: falsy values render empty, lists are
    /// joined with `", "`.
    pub fn to_lenient_string(&self) -> String {
        if !self.is_truthy() {
            return String::new();
        }
        match self {
            Self::List(items) => items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            other => other.to_string(),
        }
    }

    /// JSON encoding with `", "`/`": "` separators and ASCII-only output.
    /// Non-finite floats become `null`.
    pub fn to_json(&self) -> String {
        let mut out = Vec::new();
        let written = self.serialize(&mut serde_json::Serializer::with_formatter(&mut out, PythonJson));
        match written {
            Ok(()) => String::from_utf8(out).unwrap_or_default(),
            Err(_) => String::new(),
        }
    }
}

/// Shortest round-trip float rendering, switching to exponent notation
/// outside of `1e-4 <= |f| < 1e16`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sci = format!("{f:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    if (-4..16).contains(&exp) {
        let point = exp + 1;
        if point <= 0 {
            format!("{sign}0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
        } else {
            let point = point as usize;
            if point >= digits.len() {
                format!("{sign}{digits}{}.0", "0".repeat(point - digits.len()))
            } else {
                format!("{sign}{}.{}", &digits[..point], &digits[point..])
            }
        }
    } else {
        let m = if digits.len() > 1 { format!("{}.{}", &digits[..1], &digits[1..]) } else { digits };
        format!("{sign}{m}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
    }
}

fn datetime_str(dt: &PrimitiveDateTime) -> String {
    let mut out = format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    if dt.microsecond() != 0 {
        _ = write!(out, ".{:06}", dt.microsecond());
    }
    out
}

fn write_repr(out: &mut String, value: &Value, ascii: bool) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => _ = write!(out, "{i}"),
        Value::Float(f) => out.push_str(&float_repr(*f)),
        Value::String(s) => write_quoted(out, s, ascii),
        Value::DateTime(dt) => {
            _ = write!(
                out,
                "datetime.datetime({}, {}, {}, {}, {}",
                dt.year(),
                u8::from(dt.month()),
                dt.day(),
                dt.hour(),
                dt.minute()
            );
            if dt.second() != 0 || dt.microsecond() != 0 {
                _ = write!(out, ", {}", dt.second());
            }
            if dt.microsecond() != 0 {
                _ = write!(out, ", {}", dt.microsecond());
            }
            out.push(')');
        },
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(out, item, ascii);
            }
            out.push(']');
        },
        Value::Map(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, k, ascii);
                out.push_str(": ");
                write_repr(out, v, ascii);
            }
            out.push('}');
        },
    }
}

fn write_quoted(out: &mut String, s: &str, ascii: bool) {
    // Prefer single quotes, unless that would require escaping and double
    // quotes wouldn't.
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            },
            c if c.is_control() || (ascii && !c.is_ascii()) => escape_char(out, c),
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn escape_char(out: &mut String, c: char) {
    let code = u32::from(c);
    _ = match code {
        0..=0xff => write!(out, "\\x{code:02x}"),
        0x100..=0xffff => write!(out, "\\u{code:04x}"),
        _ => write!(out, "\\U{code:08x}"),
    };
}

/// `json.dumps` layout: `", "` and `": "` separators, Python float reprs, and
/// everything outside printable ASCII escaped as `\uXXXX`.
struct PythonJson;

impl serde_json::ser::Formatter for PythonJson {
    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        for c in fragment.chars() {
            if matches!(c, ' '..='~') {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}
