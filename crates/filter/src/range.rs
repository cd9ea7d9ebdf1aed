use crate::Predicate;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use trove_record::Record;

/// A closed interval of 1-based record indices.
pub type Interval = (u64, u64);

/// Accepts records whose position in the run falls inside a set of intervals.
///
/// Every call advances a 1-based counter. Once the counter passes the upper
/// bound of the last interval no later record can match, so the predicate
/// raises [`ErrorKind::Stop`] instead of rejecting.
#[derive(Debug, Clone)]
pub struct RangePredicate {
    ranges: Vec<Interval>,
    index: u64,
    upper: u64,
}

impl RangePredicate {
    pub fn new(spec: &str) -> Result<Self> {
        let ranges = optimize_range(parse_range(spec)?);
        let upper = ranges.last().map_or(0, |(_, upper)| *upper);
        Ok(Self { ranges, index: 0, upper })
    }

    pub fn ranges(&self) -> &[Interval] {
        &self.ranges
    }

    /// How many records have been checked so far.
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Predicate for RangePredicate {
    fn check(&mut self, _url: &str, _record: &Record) -> Result<bool> {
        self.index = self.index.saturating_add(1);
        if self.index > self.upper {
            tracing::debug!(index = self.index, upper = self.upper, "range exhausted");
            exn::bail!(ErrorKind::Stop);
        }
        Ok(self.ranges.iter().any(|(lower, upper)| (*lower..=*upper).contains(&self.index)))
    }
}

/// Parses a comma-separated list of indices (`4`) and ranges (`2-6`, `-3`,
/// `10-`). An open start means 1, an open end means [`u64::MAX`], reversed
/// bounds are swapped and empty groups are ignored.
pub fn parse_range(spec: &str) -> Result<Vec<Interval>> {
    let mut ranges = Vec::new();
    for group in spec.split(',') {
        if group.is_empty() {
            continue;
        }
        let (begin, end) = match group.split_once('-') {
            None => {
                let index = bound(group, spec)?;
                (index, index)
            },
            Some((first, last)) => {
                let begin = if first.trim().is_empty() { 1 } else { bound(first, spec)? };
                let end = if last.trim().is_empty() { u64::MAX } else { bound(last, spec)? };
                (begin, end)
            },
        };
        ranges.push(if begin <= end { (begin, end) } else { (end, begin) });
    }
    Ok(ranges)
}

fn bound(text: &str, spec: &str) -> Result<u64> {
    text.trim().parse::<u64>().or_raise(|| ErrorKind::Range(spec.to_string()))
}

/// Sorts intervals and merges those that overlap or are separated by a gap of
/// at most one.
pub fn optimize_range(mut ranges: Vec<Interval>) -> Vec<Interval> {
    if ranges.len() <= 1 {
        return ranges;
    }
    ranges.sort_unstable();
    let mut merged: Vec<Interval> = Vec::with_capacity(ranges.len());
    for (lower, upper) in ranges {
        match merged.last_mut() {
            Some((_, end)) if lower <= end.saturating_add(1) => *end = (*end).max(upper),
            _ => merged.push((lower, upper)),
        }
    }
    merged
}
