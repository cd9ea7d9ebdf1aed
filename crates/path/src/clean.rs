use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Replaces a set of characters in path text.
#[derive(Debug, Clone)]
pub(crate) enum Cleaner {
    Identity,
    Char(char, String),
    Class(Regex, String),
    Map(HashMap<char, String>),
}

impl Cleaner {
    /// `chars` is the inside of a regex character class (`a-z`, `^0-9`).
    pub(crate) fn class(chars: &str, replacement: &str) -> Result<Self> {
        let mut iter = chars.chars();
        Ok(match (iter.next(), iter.next()) {
            (None, _) => Self::Identity,
            (Some(c), None) => Self::Char(c, replacement.to_string()),
            _ => {
                let regex = Regex::new(&format!("[{chars}]")).or_raise(|| ErrorKind::Restrict(chars.to_string()))?;
                Self::Class(regex, replacement.to_string())
            },
        })
    }

    pub(crate) fn map(map: &BTreeMap<char, String>) -> Self {
        Self::Map(map.iter().map(|(c, replacement)| (*c, replacement.clone())).collect())
    }

    pub(crate) fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            Self::Identity => Cow::Borrowed(text),
            Self::Char(c, replacement) => match text.contains(*c) {
                true => Cow::Owned(text.replace(*c, replacement)),
                false => Cow::Borrowed(text),
            },
            Self::Class(regex, replacement) => regex.replace_all(text, NoExpand(replacement)),
            Self::Map(map) => match text.chars().any(|c| map.contains_key(&c)) {
                true => Cow::Owned(text.chars().fold(String::with_capacity(text.len()), |mut out, c| {
                    match map.get(&c) {
                        Some(replacement) => out.push_str(replacement),
                        None => out.push(c),
                    }
                    out
                })),
                false => Cow::Borrowed(text),
            },
        }
    }
}
