//! Replacement-field templates rendered against a [`Record`].
//!
//! A template is literal text with `{field!conversion:spec}` replacement
//! fields, `{{` and `}}` standing for literal braces.
//!
//! - **field**: a record key followed by any chain of `.attr`, `[index]`,
//!   `[key]` and `[start:stop:step]`. `a|b|c` picks the first truthy
//!   alternative. A field that doesn't resolve renders the template's default.
//! - **conversion**: `l` lower, `u` upper, `c` capitalize, `C` capitalize
//!   words, `j` JSON, `t` strip, `d` timestamp to datetime, `T` datetime to
//!   timestamp, `U` URL-unquote, `S` lenient string, `s` str, `r` repr,
//!   `a` ascii.
//! - **spec**: the standard `[[fill]align][sign][#][0][width][,|_][.precision][type]`
//!   (a strftime pattern for datetimes), or one of the chaining specs below,
//!   each of which hands the rest of the spec to the next formatter:
//!
//! | Spec                 | Effect                                                      |
//! |----------------------|-------------------------------------------------------------|
//! | `?before/after/`     | wraps a truthy value, renders nothing for a falsy one       |
//! | `Lmax/replacement/`  | replaces output longer than `max` characters                |
//! | `Jseparator/`        | joins a list                                                |
//! | `Rold/new/`          | replaces every occurrence of `old`                          |
//!
//! Compilation is the only fallible step. Rendering never fails.
//!
//! # Example
//!
//! ```
//! use trove_format::{Formatter, TemplateCache};
//! use trove_record::{Record, Value};
//!
//! let cache = TemplateCache::new();
//! let formatter = Formatter::new(&cache, "{id:>05}{title:?_//}.{extension}", Value::Null).unwrap();
//! let record = Record::new().with("id", 42).with("title", "cat").with("extension", "png");
//! assert_eq!(formatter.format(&record), "00042_cat.png");
//! ```

mod cache;
mod error;
mod parse;
mod spec;
mod standard;

pub use crate::cache::{CompiledTemplate, TemplateCache};
pub use crate::error::{Error, ErrorKind, Result};
use std::sync::Arc;
use tracing::instrument;
use trove_record::{Record, Value};

/// A compiled template bound to its default value.
#[derive(Debug, Clone)]
pub struct Formatter {
    compiled: Arc<CompiledTemplate>,
}

impl Formatter {
    /// Compiles `template` through `cache`, or reuses the compiled template if
    /// the same template and default were compiled before.
    #[instrument(level = "trace", skip_all, fields(template))]
    pub fn new(cache: &TemplateCache, template: &str, default: impl Into<Value>) -> Result<Self> {
        let compiled = cache.get_or_compile(template, &default.into())?;
        Ok(Self { compiled })
    }

    pub fn format(&self, record: &Record) -> String {
        self.compiled.render(record)
    }

    pub fn template(&self) -> &str {
        self.compiled.source()
    }

    pub fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.compiled
    }
}
