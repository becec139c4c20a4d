//! Node references and attribute values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Store used for generated references
pub const DEFAULT_STORE: &str = "workspace://SpacesStore";

/// Reference to a managed object: `<protocol>://<store>/<id>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    store: String,
    id: String,
}

impl NodeRef {
    /// Create a reference in an explicit store
    #[inline]
    #[must_use]
    pub fn new(store: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            id: id.into(),
        }
    }

    /// Generate a fresh reference in the default store
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self::new(DEFAULT_STORE, uuid::Uuid::new_v4().to_string())
    }

    /// Store part (`workspace://SpacesStore`)
    #[inline]
    #[must_use]
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Identifier part
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}

impl FromStr for NodeRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (proto, rest) = s
            .split_once("://")
            .ok_or_else(|| format!("missing protocol in node reference '{s}'"))?;
        let (store, id) = rest
            .rsplit_once('/')
            .ok_or_else(|| format!("missing identifier in node reference '{s}'"))?;
        if proto.is_empty() || store.is_empty() || id.is_empty() {
            return Err(format!("incomplete node reference '{s}'"));
        }
        Ok(Self::new(format!("{proto}://{store}"), id))
    }
}

/// Stored attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Text(String),
    /// Multilingual text keyed by locale
    MlText(BTreeMap<String, String>),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    /// Plain text value
    #[inline]
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Short type label for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::MlText(_) => "mltext",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "datetime",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::MlText(texts) => match texts.values().next() {
                Some(s) => f.write_str(s),
                None => Ok(()),
            },
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_round_trips_through_display() {
        let node = NodeRef::new("workspace://SpacesStore", "abc-123");
        assert_eq!(node.to_string(), "workspace://SpacesStore/abc-123");
        assert_eq!(node.to_string().parse::<NodeRef>().unwrap(), node);
    }

    #[test]
    fn node_ref_rejects_incomplete() {
        assert!("SpacesStore/abc".parse::<NodeRef>().is_err());
        assert!("workspace://abc".parse::<NodeRef>().is_err());
        assert!("workspace://SpacesStore/".parse::<NodeRef>().is_err());
    }

    #[test]
    fn generated_refs_are_unique() {
        assert_ne!(NodeRef::generate(), NodeRef::generate());
        assert_eq!(NodeRef::generate().store(), DEFAULT_STORE);
    }

    #[test]
    fn value_display() {
        let list = Value::List(vec![Value::text("a"), Value::Int(2), Value::Bool(true)]);
        assert_eq!(list.to_string(), "a, 2, true");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn null_detection() {
        assert!(Value::Null.is_null());
        assert!(!Value::text("").is_null());
        assert!(!Value::List(Vec::new()).is_null());
    }

    #[test]
    fn value_as_bool() {
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::text("true").as_bool(), Some(true));
        assert_eq!(Value::Int(1).as_bool(), None);
    }
}
