use crate::Predicate;
use crate::error::Result;
use std::collections::HashSet;
use trove_record::Record;

/// URLs with this scheme carry inline text rather than a location, so two
/// equal ones are still two distinct records.
pub const TEXT_SCHEME: &str = "text:";

/// Accepts each URL the first time it is seen during a run.
#[derive(Debug, Clone, Default)]
pub struct UniquePredicate {
    seen: HashSet<String>,
}

impl UniquePredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Predicate for UniquePredicate {
    fn check(&mut self, url: &str, _record: &Record) -> Result<bool> {
        if url.starts_with(TEXT_SCHEME) {
            return Ok(true);
        }
        if self.seen.contains(url) {
            tracing::trace!(url, "duplicate url");
            return Ok(false);
        }
        self.seen.insert(url.to_string());
        Ok(true)
    }
}
