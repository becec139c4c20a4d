//! Value converters
//!
//! A [`ConverterChain`] is evaluated left to right: the first converter
//! whose [`ValueConverter::applicable`] accepts the value transforms it and
//! no other converter runs. With no applicable converter the value passes
//! through unchanged.

use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use mdw_repo::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pluggable value transformation
pub trait ValueConverter: Send + Sync + fmt::Debug {
    /// Short name for diagnostics
    fn name(&self) -> &str;

    /// Whether this converter handles `value`
    fn applicable(&self, value: &Value) -> bool;

    /// Transform a value this converter declared applicable
    fn convert(&self, value: Value) -> Value;
}

/// Ordered, shared converter list
#[derive(Debug, Clone, Default)]
pub struct ConverterChain {
    converters: Vec<Arc<dyn ValueConverter>>,
}

impl ConverterChain {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the chain described by configuration
    ///
    /// # Errors
    /// `ConfigError::Invalid` if a converter's settings are unusable.
    pub fn from_config(configs: &[ConverterConfig]) -> Result<Self, ConfigError> {
        let converters = configs
            .iter()
            .map(ConverterConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { converters })
    }

    /// Append a converter at the end of the chain
    #[must_use]
    pub fn with(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converters.push(converter);
        self
    }

    pub fn push(&mut self, converter: Arc<dyn ValueConverter>) {
        self.converters.push(converter);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Converter names in evaluation order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    /// Run `value` through the first applicable converter
    #[must_use]
    pub fn convert(&self, value: Value) -> Value {
        match self.converters.iter().find(|c| c.applicable(&value)) {
            Some(converter) => {
                tracing::trace!(converter = converter.name(), kind = value.kind(), "converting value");
                converter.convert(value)
            }
            None => {
                tracing::trace!(kind = value.kind(), "no applicable converter");
                value
            }
        }
    }
}

/// Formats date-time values with a strftime pattern
#[derive(Debug, Clone)]
pub struct DateConverter {
    format: String,
}

impl DateConverter {
    /// # Errors
    /// `ConfigError::Invalid` if `format` is not a valid strftime pattern.
    pub fn new(format: impl Into<String>) -> Result<Self, ConfigError> {
        let format = format.into();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!("invalid date format '{format}'")));
        }
        Ok(Self { format })
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }
}

impl ValueConverter for DateConverter {
    fn name(&self) -> &str {
        "date"
    }

    fn applicable(&self, value: &Value) -> bool {
        matches!(value, Value::DateTime(_))
    }

    fn convert(&self, value: Value) -> Value {
        match value {
            Value::DateTime(dt) => Value::Text(dt.format(&self.format).to_string()),
            other => other,
        }
    }
}

/// Joins list values into one text value
#[derive(Debug, Clone)]
pub struct ListJoinConverter {
    separator: String,
}

impl ListJoinConverter {
    #[inline]
    #[must_use]
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl ValueConverter for ListJoinConverter {
    fn name(&self) -> &str {
        "list"
    }

    fn applicable(&self, value: &Value) -> bool {
        matches!(value, Value::List(_))
    }

    fn convert(&self, value: Value) -> Value {
        match value {
            Value::List(items) => Value::Text(
                items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(&self.separator),
            ),
            other => other,
        }
    }
}

/// Renders booleans as configurable text
#[derive(Debug, Clone)]
pub struct BooleanConverter {
    true_text: String,
    false_text: String,
}

impl BooleanConverter {
    #[inline]
    #[must_use]
    pub fn new(true_text: impl Into<String>, false_text: impl Into<String>) -> Self {
        Self {
            true_text: true_text.into(),
            false_text: false_text.into(),
        }
    }
}

impl ValueConverter for BooleanConverter {
    fn name(&self) -> &str {
        "boolean"
    }

    fn applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Bool(_))
    }

    fn convert(&self, value: Value) -> Value {
        match value {
            Value::Bool(true) => Value::text(self.true_text.clone()),
            Value::Bool(false) => Value::text(self.false_text.clone()),
            other => other,
        }
    }
}

/// Converter selected by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConverterConfig {
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },
    List {
        #[serde(default = "default_separator")]
        separator: String,
    },
    Boolean {
        #[serde(default = "default_true_text")]
        true_text: String,
        #[serde(default = "default_false_text")]
        false_text: String,
    },
}

fn default_date_format() -> String {
    "%Y-%m-%dT%H:%M:%S%:z".to_string()
}

fn default_separator() -> String {
    ", ".to_string()
}

fn default_true_text() -> String {
    "Yes".to_string()
}

fn default_false_text() -> String {
    "No".to_string()
}

impl ConverterConfig {
    /// Instantiate the configured converter
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the settings are unusable.
    pub fn build(&self) -> Result<Arc<dyn ValueConverter>, ConfigError> {
        Ok(match self {
            Self::Date { format } => Arc::new(DateConverter::new(format.clone())?),
            Self::List { separator } => Arc::new(ListJoinConverter::new(separator.clone())),
            Self::Boolean {
                true_text,
                false_text,
            } => Arc::new(BooleanConverter::new(true_text.clone(), false_text.clone())),
        })
    }
}
