//! Item, slice and attribute access shared by templates and expressions.

use crate::Value;

impl Value {
    /// Element `index` of a list or character of a string; negative indices
    /// count from the end.
    pub fn index(&self, index: i64) -> Option<Value> {
        match self {
            Self::List(items) => resolve_index(items.len(), index).map(|i| items[i].clone()),
            Self::String(s) => {
                let len = s.chars().count();
                resolve_index(len, index).and_then(|i| s.chars().nth(i)).map(|c| Value::String(c.to_string()))
            },
            _ => None,
        }
    }

    /// `value[start:stop:step]` for lists and strings. `None` for any other
    /// type or a zero step.
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Option<Value> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return None;
        }
        match self {
            Self::List(items) => {
                let picked = slice_indices(items.len(), start, stop, step).into_iter().map(|i| items[i].clone());
                Some(Value::List(picked.collect()))
            },
            Self::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), start, stop, step).into_iter().map(|i| chars[i]);
                Some(Value::String(picked.collect()))
            },
            _ => None,
        }
    }

    /// Attribute access: map keys, and the components of a datetime.
    pub fn attr(&self, name: &str) -> Option<Value> {
        match self {
            Self::Map(map) => map.get(name).cloned(),
            Self::DateTime(dt) => Some(Value::Int(match name {
                "year" => i64::from(dt.year()),
                "month" => i64::from(u8::from(dt.month())),
                "day" => i64::from(dt.day()),
                "hour" => i64::from(dt.hour()),
                "minute" => i64::from(dt.minute()),
                "second" => i64::from(dt.second()),
                "microsecond" => i64::from(dt.microsecond()),
                _ => return None,
            })),
            _ => None,
        }
    }

    /// `value[key]`: integer keys index lists and strings, string keys look
    /// up maps.
    pub fn item(&self, key: &Value) -> Option<Value> {
        match (self, key) {
            (Self::Map(map), Self::String(k)) => map.get(k).cloned(),
            (Self::List(_) | Self::String(_), Self::Int(i)) => self.index(*i),
            (Self::List(_) | Self::String(_), Self::Bool(b)) => self.index(i64::from(*b)),
            _ => None,
        }
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let mut out = Vec::new();
    if step > 0 {
        let clamp = |v: i64| if v < 0 { (v + len).max(0) } else { v.min(len) };
        let (start, stop) = (start.map_or(0, clamp), stop.map_or(len, clamp));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let clamp = |v: i64| if v < 0 { (v + len).max(-1) } else { v.min(len - 1) };
        let (start, stop) = (start.map_or(len - 1, clamp), stop.map_or(-1, clamp));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    out
}
