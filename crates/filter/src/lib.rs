//! Predicates deciding which records of a run are processed.
//!
//! Each predicate sees the record's URL and its metadata and answers whether
//! to keep it. Predicates are stateful: [`RangePredicate`] counts records and
//! [`UniquePredicate`] remembers URLs, so one instance belongs to one run.
//! Wrap an instance in [`SharedPredicate`] to check records from several
//! workers while keeping the counter and the seen-set consistent.

mod error;
mod expression;
mod range;
mod unique;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::expression::FilterPredicate;
pub use crate::range::{Interval, RangePredicate, optimize_range, parse_range};
pub use crate::unique::{TEXT_SCHEME, UniquePredicate};
use std::sync::{Arc, Mutex, PoisonError};
use trove_record::Record;

pub trait Predicate: Send {
    /// `Ok(false)` rejects the record. [`ErrorKind::Stop`] and
    /// [`ErrorKind::Terminate`] end the run.
    fn check(&mut self, url: &str, record: &Record) -> Result<bool>;
}

impl<P: Predicate + ?Sized> Predicate for Box<P> {
    fn check(&mut self, url: &str, record: &Record) -> Result<bool> {
        (**self).check(url, record)
    }
}

/// Short-circuiting conjunction. An empty chain accepts everything.
#[derive(Default)]
pub struct Predicates {
    chain: Vec<Box<dyn Predicate>>,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: impl Predicate + 'static) {
        self.chain.push(Box::new(predicate));
    }

    pub fn with(mut self, predicate: impl Predicate + 'static) -> Self {
        self.push(predicate);
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl Predicate for Predicates {
    fn check(&mut self, url: &str, record: &Record) -> Result<bool> {
        for predicate in &mut self.chain {
            if !predicate.check(url, record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A predicate shared between workers. Clones check against the same state.
pub struct SharedPredicate<P> {
    inner: Arc<Mutex<P>>,
}

impl<P> Clone for SharedPredicate<P> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<P: Predicate> SharedPredicate<P> {
    pub fn new(predicate: P) -> Self {
        Self { inner: Arc::new(Mutex::new(predicate)) }
    }

    /// Checks while holding the lock, so each call observes and advances the
    /// state exactly once.
    pub fn check(&self, url: &str, record: &Record) -> Result<bool> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).check(url, record)
    }
}

impl<P: Predicate> Predicate for SharedPredicate<P> {
    fn check(&mut self, url: &str, record: &Record) -> Result<bool> {
        SharedPredicate::check(self, url, record)
    }
}
