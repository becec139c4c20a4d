//! Concrete value extraction
//!
//! Stored values may be richer than what an artifact property can hold.
//! An extractor reduces a raw value to the concrete value to write, or to
//! nothing, in which case the attribute is dropped from the property map.

use mdw_repo::Value;
use std::fmt;

/// Reduces a stored value to the value written to the artifact
pub trait PropertyValueExtractor: Send + Sync + fmt::Debug {
    /// `None` drops the attribute
    fn extract(&self, value: &Value) -> Option<Value>;
}

/// Default extraction rules
///
/// - null yields nothing
/// - multilingual text yields the preferred locale, else the first entry
/// - lists keep their extractable items and yield nothing when empty
/// - everything else passes through
#[derive(Debug, Clone, Default)]
pub struct DefaultValueExtractor {
    locale: Option<String>,
}

impl DefaultValueExtractor {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer `locale` when reducing multilingual text
    #[inline]
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

impl PropertyValueExtractor for DefaultValueExtractor {
    fn extract(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Null => None,
            Value::MlText(texts) => self
                .locale
                .as_ref()
                .and_then(|locale| texts.get(locale))
                .or_else(|| texts.values().next())
                .map(|text| Value::Text(text.clone())),
            Value::List(items) => {
                let items: Vec<Value> = items.iter().filter_map(|i| self.extract(i)).collect();
                (!items.is_empty()).then_some(Value::List(items))
            }
            other => Some(other.clone()),
        }
    }
}
