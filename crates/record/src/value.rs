use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use time::{OffsetDateTime, PrimitiveDateTime};

/// A single dynamically-typed metadata value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Naive UTC date and time.
    DateTime(PrimitiveDateTime),
}

impl Value {
    /// Truthiness: `None`, `False`, zero, and empty containers are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
            Self::DateTime(_) => true,
        }
    }

    /// Name of the value's type, as shown in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::DateTime(_) => "datetime",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up `key` if this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Lenient integer parsing: booleans, integers, truncated floats, and
    /// strings holding a (possibly signed, underscore-separated) integer.
    pub fn parse_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::String(s) => {
                let s = s.trim();
                let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
                if digits.is_empty()
                    || digits.starts_with('_')
                    || digits.ends_with('_')
                    || digits.contains("__")
                    || !digits.chars().all(|c| c.is_ascii_digit() || c == '_')
                {
                    return None;
                }
                s.replace('_', "").parse().ok()
            },
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Converts a UNIX timestamp (integer, float or numeric string) into a naive
/// UTC datetime. Anything unparseable yields `None`.
pub fn parse_timestamp(value: &Value) -> Option<PrimitiveDateTime> {
    let seconds = match value {
        Value::Int(i) => *i,
        Value::Float(f) if f.is_finite() => f.trunc() as i64,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let dt = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    Some(PrimitiveDateTime::new(dt.date(), dt.time()))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}
impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}
impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::DateTime(value)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Map(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(a) => Self::List(a.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(o) => Self::Map(o.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::DateTime(_) => serializer.serialize_str(&self.to_string()),
            Self::List(l) => {
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for item in l {
                    seq.serialize_element(item)?;
                }
                seq.end()
            },
            Self::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Null, false)]
    #[case(Value::Bool(false), false)]
    #[case(Value::Int(0), false)]
    #[case(Value::Float(0.0), false)]
    #[case(Value::from(""), false)]
    #[case(Value::List(vec![]), false)]
    #[case(Value::Int(-1), true)]
    #[case(Value::from("0"), true)]
    #[case(Value::from(vec!["a"]), true)]
    fn test_truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[rstest]
    #[case(Value::from(" 42 "), Some(42))]
    #[case(Value::from("-1_000"), Some(-1000))]
    #[case(Value::from("4.2"), None)]
    #[case(Value::from("_1"), None)]
    #[case(Value::Float(3.9), Some(3))]
    #[case(Value::Null, None)]
    fn test_parse_int(#[case] value: Value, #[case] expected: Option<i64>) {
        assert_eq!(value.parse_int(), expected);
    }

    #[test]
    fn test_parse_timestamp() {
        let dt = parse_timestamp(&Value::from("86400")).unwrap();
        assert_eq!((dt.year(), u8::from(dt.month()), dt.day()), (1970, 1, 2));
        assert_eq!(dt.hour(), 0);
        assert!(parse_timestamp(&Value::from("tomorrow")).is_none());
        assert!(parse_timestamp(&Value::Null).is_none());
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value = serde_json::from_str(r#"{"a": [1, 2.5, null], "b": {"c": true}}"#).unwrap();
        let value = Value::from(json);
        let a = value.get("a").unwrap();
        assert_eq!(a, &Value::List(vec![Value::Int(1), Value::Float(2.5), Value::Null]));
        assert_eq!(value.get("b").and_then(|b| b.get("c")), Some(&Value::Bool(true)));
    }
}
