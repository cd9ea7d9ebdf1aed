use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Iter;

/// Metadata describing a single downloadable item.
///
/// Keys starting with an underscore are private: templates and expressions can
/// read them, but [`public`](Self::public) leaves them out so they never end up
/// in persisted metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this record without private (`_`-prefixed) entries.
    pub fn public(&self) -> Self {
        self.fields.iter().filter(|(k, _)| !k.starts_with('_')).map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Recursively merges `other` into this record; nested maps are combined,
    /// everything else is overwritten.
    pub fn combine(&mut self, other: Record) {
        for (key, value) in other.fields {
            match (self.fields.get_mut(&key), value) {
                (Some(Value::Map(existing)), Value::Map(incoming)) => combine_maps(existing, incoming),
                (_, value) => {
                    self.fields.insert(key, value);
                },
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Map(self.fields)
    }
}

fn combine_maps(a: &mut BTreeMap<String, Value>, b: BTreeMap<String, Value>) {
    for (key, value) in b {
        match (a.get_mut(&key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => combine_maps(existing, incoming),
            (_, value) => {
                a.insert(key, value);
            },
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_strips_private_keys() {
        let record = Record::new().with("id", 1).with("_mtime", 12345).with("_archive_key", "x1");
        let public = record.public();
        assert_eq!(public.len(), 1);
        assert!(public.contains_key("id"));
        // Private keys remain readable on the original.
        assert_eq!(record.get("_mtime"), Some(&Value::Int(12345)));
    }

    #[test]
    fn test_combine_merges_nested_maps() {
        let mut a: Record = serde_json::from_str(r#"{"user": {"name": "a", "id": 1}, "n": 1}"#).unwrap();
        let b: Record = serde_json::from_str(r#"{"user": {"name": "b"}, "n": [2]}"#).unwrap();
        a.combine(b);
        let user = a.get("user").unwrap();
        assert_eq!(user.get("name"), Some(&Value::from("b")));
        assert_eq!(user.get("id"), Some(&Value::Int(1)));
        assert_eq!(a.get("n"), Some(&Value::from(vec![2])));
    }
}
