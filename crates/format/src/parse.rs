//! Splitting a template into literal text and replacement fields.

use crate::error::{ErrorKind, Result};
use crate::spec::{Conversion, FormatSpec};
use memchr::memchr2;
use trove_record::{Record, Value};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Field {
    pub(crate) access: Access,
    pub(crate) conversion: Option<Conversion>,
    pub(crate) spec: FormatSpec,
}

impl Field {
    pub(crate) fn render(&self, record: &Record, default: &Value) -> String {
        let mut value = self.access.resolve(record).unwrap_or_else(|| default.clone());
        if let Some(conversion) = self.conversion {
            value = conversion.apply(value);
        }
        self.spec.apply(&value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Access {
    Single(FieldPath),
    /// `a|b|c`: the first alternative that resolves to a truthy value.
    Alternatives(Vec<FieldPath>),
}

impl Access {
    fn resolve(&self, record: &Record) -> Option<Value> {
        match self {
            Self::Single(path) => path.resolve(record),
            Self::Alternatives(paths) => paths.iter().filter_map(|path| path.resolve(record)).find(Value::is_truthy),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldPath {
    key: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Attr(String),
    Item(Value),
    Slice(Option<i64>, Option<i64>, Option<i64>),
}

impl FieldPath {
    /// `None` as soon as any step fails.
    fn resolve(&self, record: &Record) -> Option<Value> {
        let mut value = record.get(&self.key)?.clone();
        for step in &self.steps {
            value = match step {
                Step::Attr(name) => value.attr(name)?,
                Step::Item(key) => value.item(key)?,
                Step::Slice(start, stop, step) => value.slice(*start, *stop, *step)?,
            };
        }
        Some(value)
    }
}

/// Parses `template` into segments. `{{` and `}}` are literal braces.
pub(crate) fn parse_template(template: &str) -> Result<Vec<Segment>> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;
    while let Some(offset) = memchr2(b'{', b'}', &bytes[pos..]) {
        let brace = pos + offset;
        literal.push_str(&template[pos..brace]);
        let doubled = bytes.get(brace + 1) == Some(&bytes[brace]);
        if doubled {
            literal.push(char::from(bytes[brace]));
            pos = brace + 2;
            continue;
        }
        if bytes[brace] == b'}' {
            exn::bail!(ErrorKind::template("single '}' encountered in format string"));
        }
        let end = field_end(template, brace + 1)?;
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        if let Some(field) = parse_field(&template[brace + 1..end])? {
            segments.push(Segment::Field(field));
        }
        pos = end + 1;
    }
    literal.push_str(&template[pos..]);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Finds the `}` closing the field that starts at `start`. Brackets in the
/// field name are skipped over, and braces nested inside the format spec are
/// balanced.
fn field_end(template: &str, start: usize) -> Result<usize> {
    let bytes = template.as_bytes();
    let mut pos = start;
    let mut in_name = true;
    let mut depth = 0usize;
    while pos < bytes.len() {
        match bytes[pos] {
            b'[' if in_name => {
                pos += memchr::memchr(b']', &bytes[pos..]).unwrap_or(bytes.len() - pos);
            },
            b':' | b'!' if in_name => in_name = false,
            b'{' if in_name => exn::bail!(ErrorKind::template("unexpected '{' in field name")),
            b'{' => depth += 1,
            b'}' if depth == 0 => return Ok(pos),
            b'}' => depth -= 1,
            _ => {},
        }
        pos += 1;
    }
    exn::bail!(ErrorKind::template("expected '}' before end of string"))
}

/// Parses the inside of `{...}`. Fields with an empty name produce nothing.
fn parse_field(field: &str) -> Result<Option<Field>> {
    let name_end = name_end(field);
    let (name, rest) = field.split_at(name_end);
    let (conversion, spec) = match rest.as_bytes().first() {
        None => (None, ""),
        Some(b':') => (None, &rest[1..]),
        _ => {
            let mut chars = rest[1..].chars();
            let Some(conversion) = chars.next() else {
                exn::bail!(ErrorKind::template("end of string while looking for conversion specifier"));
            };
            let spec = chars.as_str();
            let spec = match spec.strip_prefix(':') {
                Some(spec) => spec,
                None if spec.is_empty() => spec,
                None => exn::bail!(ErrorKind::template("expected ':' after conversion specifier")),
            };
            (Some(Conversion::parse(conversion)?), spec)
        },
    };
    let spec = FormatSpec::parse(spec)?;
    if name.is_empty() {
        return Ok(None);
    }
    let access = if name.contains('|') {
        Access::Alternatives(name.split('|').map(parse_field_path).collect::<Result<_>>()?)
    } else {
        Access::Single(parse_field_path(name)?)
    };
    Ok(Some(Field { access, conversion, spec }))
}

fn name_end(field: &str) -> usize {
    let bytes = field.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'[' => pos += memchr::memchr(b']', &bytes[pos..]).unwrap_or(bytes.len() - pos),
            b':' | b'!' => return pos,
            _ => {},
        }
        pos += 1;
    }
    bytes.len()
}

/// `first(.attr|[key]|[start:stop:step])*`
fn parse_field_path(name: &str) -> Result<FieldPath> {
    let first_end = name.find(['.', '[']).unwrap_or(name.len());
    let key = name[..first_end].to_string();
    let mut rest = &name[first_end..];
    let mut steps = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                exn::bail!(ErrorKind::template("empty attribute in format string"));
            }
            steps.push(Step::Attr(after[..end].to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let Some(end) = after.find(']') else {
                exn::bail!(ErrorKind::template("missing ']' in format string"));
            };
            steps.push(parse_item(&after[..end])?);
            rest = &after[end + 1..];
            if !rest.is_empty() && !rest.starts_with(['.', '[']) {
                exn::bail!(ErrorKind::template("only '.' or '[' may follow ']' in format field specifier"));
            }
        } else {
            exn::bail!(ErrorKind::template(format!("invalid field name {name:?}")));
        }
    }
    Ok(FieldPath { key, steps })
}

fn parse_item(key: &str) -> Result<Step> {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        let index = key.parse().ok().map(Value::Int);
        return Ok(Step::Item(index.unwrap_or_else(|| Value::from(key))));
    }
    if !key.contains(':') {
        return Ok(Step::Item(Value::from(key)));
    }
    let (start, stop) = key.split_once(':').unwrap_or((key, ""));
    let (stop, step) = stop.split_once(':').unwrap_or((stop, ""));
    Ok(Step::Slice(slice_bound(start)?, slice_bound(stop)?, slice_bound(step)?))
}

fn slice_bound(bound: &str) -> Result<Option<i64>> {
    if bound.is_empty() {
        return Ok(None);
    }
    match bound.trim().parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => exn::bail!(ErrorKind::template(format!("invalid slice index {bound:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn path(name: &str) -> FieldPath {
        parse_field_path(name).unwrap()
    }

    #[test]
    fn test_literals_and_escapes() {
        let segments = parse_template("a {{b}} c").unwrap();
        assert_eq!(segments, vec![Segment::Literal("a {b} c".to_string())]);
    }

    #[test]
    fn test_field_steps() {
        assert_eq!(
            path("user.name[0][1:-1:2]['x']"),
            FieldPath {
                key: "user".to_string(),
                steps: vec![
                    Step::Attr("name".to_string()),
                    Step::Item(Value::Int(0)),
                    Step::Slice(Some(1), Some(-1), Some(2)),
                    Step::Item(Value::from("'x'")),
                ],
            }
        );
        assert_eq!(path("tags[::2]").steps, vec![Step::Slice(None, None, Some(2))]);
    }

    #[test]
    fn test_slice_inside_field_is_not_a_spec() {
        let segments = parse_template("{title[:5]:>8}").unwrap();
        let [Segment::Field(field)] = segments.as_slice() else {
            panic!("expected a single field");
        };
        assert_eq!(field.access, Access::Single(path("title[:5]")));
    }

    #[test]
    fn test_nested_braces_in_spec() {
        let segments = parse_template("{a:?{/}/}").unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_empty_field_is_dropped() {
        assert_eq!(parse_template("x{}y").unwrap().len(), 2);
    }

    #[rstest]
    #[case("{")]
    #[case("}")]
    #[case("{a")]
    #[case("{a!}")]
    #[case("{a!q}")]
    #[case("{a!lx}")]
    #[case("{a[0}")]
    #[case("{a.}")]
    #[case("{a[0]b}")]
    #[case("{a[x:1]}")]
    #[case("{a:?x/}")]
    fn test_invalid(#[case] template: &str) {
        let err = parse_template(template).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template(_)), "{template}");
    }
}
