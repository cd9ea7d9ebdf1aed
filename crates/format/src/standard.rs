//! The standard format spec: `[[fill]align][sign][#][0][width][,|_][.precision][type]`.
//!
//! Strings, integers and floats follow the usual rules. Datetimes treat the
//! whole spec as a strftime pattern. A spec that doesn't fit the value's type
//! (`{title:d}`, `{tags:>10}`) pads the value's plain string form instead of
//! failing.

use time::PrimitiveDateTime;
use trove_record::{Value, float_repr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    /// Padding goes between the sign and the digits.
    AfterSign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StandardSpec {
    fill: char,
    align: Option<Align>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        '=' => Some(Align::AfterSign),
        _ => None,
    }
}

impl StandardSpec {
    /// `None` if `spec` isn't a well-formed standard spec.
    pub(crate) fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Self {
            fill: ' ',
            align: None,
            sign: None,
            alternate: false,
            zero: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        };
        let mut i = 0;
        let mut explicit_fill = false;
        if let Some(align) = chars.get(1).copied().and_then(align_of) {
            (out.fill, out.align, i) = (chars[0], Some(align), 2);
            explicit_fill = true;
        } else if let Some(align) = chars.first().copied().and_then(align_of) {
            (out.align, i) = (Some(align), 1);
        }
        if let Some(&sign @ ('+' | '-' | ' ')) = chars.get(i) {
            out.sign = Some(sign);
            i += 1;
        }
        if chars.get(i) == Some(&'#') {
            out.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            if !explicit_fill {
                out.fill = '0';
            }
            i += 1;
        }
        let (width, next) = digits(&chars, i);
        out.width = width.unwrap_or(0);
        i = next;
        if let Some(&grouping @ (',' | '_')) = chars.get(i) {
            out.grouping = Some(grouping);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            let (precision, next) = digits(&chars, i + 1);
            out.precision = Some(precision?);
            i = next;
        }
        if let Some(&kind) = chars.get(i) {
            if !"bcdeEfFgGnosxX%".contains(kind) {
                return None;
            }
            out.kind = Some(kind);
            i += 1;
        }
        (i == chars.len()).then_some(out)
    }
}

fn digits(chars: &[char], start: usize) -> (Option<usize>, usize) {
    let rest = chars.get(start..).unwrap_or_default();
    let count = rest.iter().take_while(|c| c.is_ascii_digit()).count();
    let text: String = rest[..count].iter().collect();
    (text.parse().ok(), start + count)
}

pub(crate) fn format_standard(value: &Value, raw: &str, spec: Option<&StandardSpec>) -> String {
    if let Value::DateTime(dt) = value {
        return strftime(dt, raw);
    }
    let Some(spec) = spec else {
        return value.to_string();
    };
    let formatted = match value {
        Value::String(s) => format_str(s, spec),
        Value::Int(i) => format_int(*i, spec),
        Value::Bool(b) => format_int(i64::from(*b), spec),
        Value::Float(f) => format_float(*f, spec),
        _ => None,
    };
    formatted.unwrap_or_else(|| pad(&value.to_string(), spec, Align::Left))
}

fn format_str(s: &str, spec: &StandardSpec) -> Option<String> {
    if spec.sign.is_some()
        || spec.alternate
        || spec.grouping.is_some()
        || spec.align == Some(Align::AfterSign)
        || !matches!(spec.kind, None | Some('s'))
    {
        return None;
    }
    let truncated: String = match spec.precision {
        Some(precision) => s.chars().take(precision).collect(),
        None => s.to_string(),
    };
    Some(pad(&truncated, spec, Align::Left))
}

fn format_int(i: i64, spec: &StandardSpec) -> Option<String> {
    let magnitude = i.unsigned_abs();
    let (prefix, digits) = match spec.kind {
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return format_float(i as f64, spec),
        _ if spec.precision.is_some() => return None,
        None | Some('d' | 'n') => ("", group(&magnitude.to_string(), spec.grouping, 3)),
        Some('b') => ("0b", group(&format!("{magnitude:b}"), spec.grouping.filter(|g| *g == '_'), 4)),
        Some('o') => ("0o", group(&format!("{magnitude:o}"), spec.grouping.filter(|g| *g == '_'), 4)),
        Some('x') => ("0x", group(&format!("{magnitude:x}"), spec.grouping.filter(|g| *g == '_'), 4)),
        Some('X') => ("0X", group(&format!("{magnitude:X}"), spec.grouping.filter(|g| *g == '_'), 4)),
        Some('c') => {
            let c = u32::try_from(i).ok().and_then(char::from_u32)?;
            return Some(pad(&c.to_string(), spec, Align::Right));
        },
        Some(_) => return None,
    };
    let prefix = if spec.alternate { prefix } else { "" };
    Some(pad_number(sign(i < 0, spec), prefix, &digits, spec))
}

fn format_float(f: f64, spec: &StandardSpec) -> Option<String> {
    let upper = matches!(spec.kind, Some('E' | 'F' | 'G'));
    let magnitude = f.abs();
    let body = if !f.is_finite() {
        let text = if f.is_nan() { "nan" } else { "inf" };
        let text = if upper { text.to_uppercase() } else { text.to_string() };
        if spec.kind == Some('%') { format!("{text}%") } else { text }
    } else {
        match spec.kind {
            Some('f' | 'F') => format!("{magnitude:.*}", spec.precision.unwrap_or(6)),
            Some('e' | 'E') => exponent(magnitude, spec.precision.unwrap_or(6), upper),
            Some('g' | 'G' | 'n') => general(magnitude, spec.precision.unwrap_or(6), spec.alternate, upper, false),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            None => match spec.precision {
                None => float_repr(magnitude),
                Some(precision) => general(magnitude, precision, spec.alternate, false, true),
            },
            Some(_) => return None,
        }
    };
    let body = match spec.grouping {
        Some(separator) if f.is_finite() => {
            let split = body.find(['.', 'e', 'E', '%']).unwrap_or(body.len());
            format!("{}{}", group(&body[..split], Some(separator), 3), &body[split..])
        },
        _ => body,
    };
    Some(pad_number(sign(f.is_sign_negative() && !f.is_nan(), spec), "", &body, spec))
}

fn sign(negative: bool, spec: &StandardSpec) -> &'static str {
    match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    }
}

/// Inserts `separator` every `every` digits, counting from the right.
fn group(digits: &str, separator: Option<char>, every: usize) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(chars.len() + chars.len() / every);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(separator);
        }
        out.push(*c);
    }
    out
}

fn exponent(x: f64, precision: usize, upper: bool) -> String {
    let formatted = format!("{x:.precision$e}");
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
}

/// `g` formatting: fixed-point while the decimal exponent is within range,
/// scientific otherwise, with trailing zeros removed. `add_dot_zero` is the
/// untyped-with-precision variant, which always keeps one fractional digit
/// in fixed-point output.
fn general(x: f64, precision: usize, alternate: bool, upper: bool, add_dot_zero: bool) -> String {
    let precision = precision.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        let formatted = format!("{:.*e}", precision - 1, x);
        formatted.split_once('e').and_then(|(_, e)| e.parse::<i32>().ok()).unwrap_or(0)
    };
    let limit = i32::try_from(precision).unwrap_or(i32::MAX) - i32::from(add_dot_zero);
    let fixed = (-4..limit).contains(&exp);
    let mut out = if fixed {
        let decimals = usize::try_from(i32::try_from(precision).unwrap_or(i32::MAX) - 1 - exp).unwrap_or(0);
        format!("{x:.decimals$}")
    } else {
        exponent(x, precision - 1, upper)
    };
    if !alternate {
        out = strip_trailing_zeros(&out);
    }
    if add_dot_zero && fixed && !out.contains('.') {
        out.push_str(".0");
    }
    out
}

fn strip_trailing_zeros(s: &str) -> String {
    let split = s.find(['e', 'E']).unwrap_or(s.len());
    let (mantissa, exp) = s.split_at(split);
    if !mantissa.contains('.') {
        return s.to_string();
    }
    format!("{}{exp}", mantissa.trim_end_matches('0').trim_end_matches('.'))
}

fn pad(text: &str, spec: &StandardSpec, default: Align) -> String {
    let align = match spec.align {
        Some(Align::AfterSign) | None => default,
        Some(align) => align,
    };
    aligned(text, spec.width, spec.fill, align)
}

fn pad_number(sign: &str, prefix: &str, digits: &str, spec: &StandardSpec) -> String {
    let (fill, align) = match (spec.zero, spec.align) {
        (true, None) => (spec.fill, Align::AfterSign),
        (_, Some(align)) => (spec.fill, align),
        (false, None) => (spec.fill, Align::Right),
    };
    if align == Align::AfterSign {
        let used = sign.len() + prefix.len() + digits.chars().count();
        let padding: String = std::iter::repeat_n(fill, spec.width.saturating_sub(used)).collect();
        return format!("{sign}{prefix}{padding}{digits}");
    }
    aligned(&format!("{sign}{prefix}{digits}"), spec.width, fill, align)
}

fn aligned(text: &str, width: usize, fill: char, align: Align) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let total = width - len;
    let (left, right) = match align {
        Align::Left => (0, total),
        Align::Right | Align::AfterSign => (total, 0),
        Align::Center => (total / 2, total - total / 2),
    };
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat_n(fill, left));
    out.push_str(text);
    out.extend(std::iter::repeat_n(fill, right));
    out
}

/// strftime-style datetime formatting. Unknown directives are kept as-is.
fn strftime(dt: &PrimitiveDateTime, pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(directive) = chars.next() else {
            out.push('%');
            break;
        };
        let month = dt.month().to_string();
        let weekday = dt.weekday().to_string();
        let hour12 = match dt.hour() % 12 {
            0 => 12,
            h => h,
        };
        match directive {
            'Y' => out.push_str(&format!("{:04}", dt.year())),
            'y' => out.push_str(&format!("{:02}", dt.year().rem_euclid(100))),
            'm' => out.push_str(&format!("{:02}", u8::from(dt.month()))),
            'd' => out.push_str(&format!("{:02}", dt.day())),
            'H' => out.push_str(&format!("{:02}", dt.hour())),
            'I' => out.push_str(&format!("{hour12:02}")),
            'M' => out.push_str(&format!("{:02}", dt.minute())),
            'S' => out.push_str(&format!("{:02}", dt.second())),
            'f' => out.push_str(&format!("{:06}", dt.microsecond())),
            'j' => out.push_str(&format!("{:03}", dt.ordinal())),
            'p' => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            'B' => out.push_str(&month),
            'b' => out.push_str(&month[..3]),
            'A' => out.push_str(&weekday),
            'a' => out.push_str(&weekday[..3]),
            'w' => out.push_str(&dt.weekday().number_days_from_sunday().to_string()),
            'z' | 'Z' => {},
            '%' => out.push('%'),
            other => {
                out.push('%');
                out.push(other);
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn format(value: Value, spec: &str) -> String {
        format_standard(&value, spec, StandardSpec::parse(spec).as_ref())
    }

    #[rstest]
    #[case(Value::Int(42), "05", "00042")]
    #[case(Value::Int(-42), "05", "-0042")]
    #[case(Value::Int(42), ">6", "    42")]
    #[case(Value::Int(42), ">05", "00042")]
    #[case(Value::Int(42), "x<05", "42xxx")]
    #[case(Value::Int(42), "<4", "42  ")]
    #[case(Value::Int(42), "*^6", "**42**")]
    #[case(Value::Int(42), "+d", "+42")]
    #[case(Value::Int(1234567), ",", "1,234,567")]
    #[case(Value::Int(255), "#x", "0xff")]
    #[case(Value::Int(255), "08b", "11111111")]
    #[case(Value::Int(65), "c", "A")]
    #[case(Value::Int(3), ".2f", "3.00")]
    #[case(Value::Bool(true), "d", "1")]
    #[case(Value::Float(3.14159), ".2f", "3.14")]
    #[case(Value::Float(3.14159), "8.3f", "   3.142")]
    #[case(Value::Float(-1.5), "e", "-1.500000e+00")]
    #[case(Value::Float(0.25), ".1%", "25.0%")]
    #[case(Value::Float(1234.5), "g", "1234.5")]
    #[case(Value::Float(0.00001), "g", "1e-05")]
    #[case(Value::Float(1.0), ".3", "1.0")]
    #[case(Value::Float(10.0), ".2", "1e+01")]
    #[case(Value::Float(2.5), "", "2.5")]
    #[case(Value::Float(1234567.891), ",.2f", "1,234,567.89")]
    #[case(Value::from("abc"), ">5", "  abc")]
    #[case(Value::from("abc"), "_<5", "abc__")]
    #[case(Value::from("abcdef"), ".3", "abc")]
    #[case(Value::from("abc"), "^7", "  abc  ")]
    fn test_standard(#[case] value: Value, #[case] spec: &str, #[case] expected: &str) {
        assert_eq!(format(value, spec), expected);
    }

    #[rstest]
    #[case(Value::from("abc"), "d", "abc")]
    #[case(Value::from("abc"), "+>5", "  abc")]
    #[case(Value::Null, ">6", "  None")]
    #[case(Value::from(vec![1]), "<5", "[1]  ")]
    #[case(Value::Int(3), "%Y", "3")]
    fn test_mismatched_spec_falls_back(#[case] value: Value, #[case] spec: &str, #[case] expected: &str) {
        assert_eq!(format(value, spec), expected);
    }

    #[rstest]
    #[case("%Y-%m-%d", "2024-03-07")]
    #[case("%H:%M:%S.%f", "14:05:09.000000")]
    #[case("%I%p %a %b", "02PM Thu Mar")]
    #[case("%A, %B %j", "Thursday, March 067")]
    #[case("%y%%%q", "24%%q")]
    fn test_strftime(#[case] pattern: &str, #[case] expected: &str) {
        let dt = datetime!(2024-03-07 14:05:09);
        assert_eq!(format(Value::DateTime(dt), pattern), expected);
    }

    #[rstest]
    #[case("")]
    #[case("x<10")]
    #[case(">+#010,.3f")]
    fn test_parse_valid(#[case] spec: &str) {
        assert!(StandardSpec::parse(spec).is_some());
    }

    #[rstest]
    #[case("10q")]
    #[case(".f")]
    #[case("%Y")]
    fn test_parse_invalid(#[case] spec: &str) {
        assert!(StandardSpec::parse(spec).is_none());
    }
}
