//! The `re` module exposed to expressions.

use regex::{Captures, Regex};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use trove_record::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReFunction {
    Search,
    Match,
    FullMatch,
    Sub,
    FindAll,
    Split,
    Compile,
}

impl ReFunction {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "search" => Self::Search,
            "match" => Self::Match,
            "fullmatch" => Self::FullMatch,
            "sub" => Self::Sub,
            "findall" => Self::FindAll,
            "split" => Self::Split,
            "compile" => Self::Compile,
            _ => return None,
        })
    }
}

/// A compiled pattern, with the anchored variants `match` and `fullmatch`
/// need built up front.
pub(crate) struct Pattern {
    source: String,
    unanchored: Regex,
    start: Regex,
    full: Regex,
}

impl Debug for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "re.compile({:?})", self.source)
    }
}

impl Pattern {
    pub(crate) fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            unanchored: Regex::new(source)?,
            start: Regex::new(&format!(r"\A(?:{source})"))?,
            full: Regex::new(&format!(r"\A(?:{source})\z"))?,
        })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn search(&self, haystack: &str) -> Option<Match> {
        self.unanchored.captures(haystack).map(Match::from)
    }

    pub(crate) fn match_start(&self, haystack: &str) -> Option<Match> {
        self.start.captures(haystack).map(Match::from)
    }

    pub(crate) fn full_match(&self, haystack: &str) -> Option<Match> {
        self.full.captures(haystack).map(Match::from)
    }

    /// Replaces up to `count` matches (all of them when `count` is 0).
    /// Backreferences use the `\1`/`\g<name>` form.
    pub(crate) fn sub(&self, replacement: &str, haystack: &str, count: usize) -> String {
        let replacement = translate_replacement(replacement);
        self.unanchored.replacen(haystack, count, replacement.as_str()).into_owned()
    }

    /// Whole matches when the pattern has no groups, the only group's text
    /// when it has one, and lists of groups otherwise.
    pub(crate) fn find_all(&self, haystack: &str) -> Vec<Value> {
        let groups = self.unanchored.captures_len() - 1;
        self.unanchored
            .captures_iter(haystack)
            .map(|caps| match groups {
                0 => Value::from(&caps[0]),
                1 => Value::from(caps.get(1).map_or("", |m| m.as_str())),
                _ => Value::List((1..=groups).map(|i| Value::from(caps.get(i).map_or("", |m| m.as_str()))).collect()),
            })
            .collect()
    }

    /// Splits around matches, keeping captured groups in the output.
    pub(crate) fn split(&self, haystack: &str, max_split: usize) -> Vec<Value> {
        let mut out = Vec::new();
        let mut last = 0;
        for (n, caps) in self.unanchored.captures_iter(haystack).enumerate() {
            if max_split != 0 && n >= max_split {
                break;
            }
            let Some(whole) = caps.get(0) else { continue };
            out.push(Value::from(&haystack[last..whole.start()]));
            out.extend(caps.iter().skip(1).map(|group| group.map_or(Value::Null, |m| Value::from(m.as_str()))));
            last = whole.end();
        }
        out.push(Value::from(&haystack[last..]));
        out
    }
}

/// Result of a successful `search`/`match`/`fullmatch`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Match {
    /// Group 0 is the whole match; unmatched optional groups are `None`.
    groups: Vec<Option<String>>,
}

impl From<Captures<'_>> for Match {
    fn from(caps: Captures<'_>) -> Self {
        Self { groups: caps.iter().map(|m| m.map(|m| m.as_str().to_string())).collect() }
    }
}

impl Match {
    pub(crate) fn group(&self, index: usize) -> Option<Value> {
        self.groups.get(index).map(|g| Value::from(g.clone()))
    }

    pub(crate) fn groups(&self) -> Value {
        Value::List(self.groups.iter().skip(1).map(|g| Value::from(g.clone())).collect())
    }

    /// Every group, the whole match first.
    pub(crate) fn to_value(&self) -> Value {
        Value::List(self.groups.iter().map(|g| Value::from(g.clone())).collect())
    }
}

/// Rewrites `\1` and `\g<name>` backreferences into `${1}`/`${name}`,
/// escaping literal dollar signs along the way.
fn translate_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                },
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                        out.push_str(&format!("${{{name}}}"));
                    } else {
                        out.push_str("\\g");
                    }
                },
                Some('n') => {
                    chars.next();
                    out.push('\n');
                },
                Some('t') => {
                    chars.next();
                    out.push('\t');
                },
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                },
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r"\1-\2", "${1}-${2}")]
    #[case(r"\g<year>", "${year}")]
    #[case("$5", "$$5")]
    #[case(r"a\\b", r"a\b")]
    fn test_translate_replacement(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(translate_replacement(input), expected);
    }

    #[test]
    fn test_anchoring() {
        let pattern = Pattern::new(r"\d+").unwrap();
        assert!(pattern.search("abc 123").is_some());
        assert!(pattern.match_start("abc 123").is_none());
        assert!(pattern.match_start("123 abc").is_some());
        assert!(pattern.full_match("123 abc").is_none());
        assert!(pattern.full_match("123").is_some());
    }

    #[test]
    fn test_alternation_is_fully_anchored() {
        let pattern = Pattern::new("a|ab").unwrap();
        assert!(pattern.full_match("ab").is_some());
    }

    #[test]
    fn test_find_all_and_split() {
        let pattern = Pattern::new(r"(\d)(\w)").unwrap();
        let found = pattern.find_all("1a 2b");
        assert_eq!(found[0], Value::from(vec!["1", "a"]));
        let comma = Pattern::new(r"\s*,\s*").unwrap();
        assert_eq!(comma.split("a , b,c", 0), vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(comma.split("a , b,c", 1), vec![Value::from("a"), Value::from("b,c")]);
    }

    #[test]
    fn test_sub_with_count() {
        let pattern = Pattern::new(r"(\w+)@(\w+)").unwrap();
        assert_eq!(pattern.sub(r"\2 at \1", "me@home you@work", 1), "home at me you@work");
    }
}
