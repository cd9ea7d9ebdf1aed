use crate::error::Result;
use crate::parse::{Segment, parse_template};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use trove_record::{Record, Value};

/// A parsed template together with the default substituted for fields that
/// don't resolve. Immutable once built.
#[derive(Debug)]
pub struct CompiledTemplate {
    source: String,
    default: Value,
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    fn compile(source: &str, default: Value) -> Result<Self> {
        let segments = parse_template(source)?;
        Ok(Self { source: source.to_string(), default, segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn default(&self) -> &Value {
        &self.default
    }

    pub(crate) fn render(&self, record: &Record) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&field.render(record, &self.default)),
            }
        }
        out
    }
}

type CacheKey = (String, String);

/// Compiled templates keyed by `(template, default)`.
///
/// Cloning the handle shares the underlying map. Population is idempotent: two
/// threads compiling the same pair at once both succeed, and whichever insert
/// lands first is the one every later lookup returns.
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    templates: Arc<RwLock<HashMap<CacheKey, Arc<CompiledTemplate>>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, template: &str, default: &Value) -> Result<Arc<CompiledTemplate>> {
        // `repr` keeps `1`, `1.0`, `True` and `'1'` apart.
        let key = (template.to_string(), default.repr());
        if let Some(compiled) = self.templates.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(CompiledTemplate::compile(template, default.clone())?);
        tracing::trace!(template, "compiled template");
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(templates.entry(key).or_insert(compiled)))
    }

    pub fn len(&self) -> usize {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
