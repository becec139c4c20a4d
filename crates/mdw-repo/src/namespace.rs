//! Qualified attribute names and prefix resolution

use crate::error::NamespaceError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace-qualified name, rendered as `{uri}local`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    namespace: String,
    local: String,
}

impl QName {
    #[inline]
    #[must_use]
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// Prefix → namespace URI table
///
/// Populated at startup and read-only afterwards. Kept in registration
/// order; when prefixes share a URI the first registered one renders.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    prefixes: IndexMap<String, String>,
}

impl NamespaceRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a prefix to a URI, replacing any previous mapping
    pub fn register(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), uri.into());
    }

    /// Builder form of [`register`](Self::register)
    #[inline]
    #[must_use]
    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.register(prefix, uri);
        self
    }

    #[inline]
    #[must_use]
    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Resolve `prefix:local` or `{uri}local` into a [`QName`]
    ///
    /// # Errors
    /// - `NamespaceError::UnknownPrefix` if the prefix is not registered
    /// - `NamespaceError::Malformed` for anything else that does not parse
    pub fn resolve(&self, name: &str) -> Result<QName, NamespaceError> {
        let name = name.trim();

        if let Some(rest) = name.strip_prefix('{') {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| NamespaceError::Malformed(name.to_string()))?;
            if uri.is_empty() || local.is_empty() {
                return Err(NamespaceError::Malformed(name.to_string()));
            }
            return Ok(QName::new(uri, local));
        }

        let (prefix, local) = name
            .split_once(':')
            .ok_or_else(|| NamespaceError::Malformed(name.to_string()))?;
        if prefix.is_empty() || local.is_empty() {
            return Err(NamespaceError::Malformed(name.to_string()));
        }

        let uri = self
            .uri(prefix)
            .ok_or_else(|| NamespaceError::UnknownPrefix {
                prefix: prefix.to_string(),
            })?;
        Ok(QName::new(uri, local))
    }

    /// Render a name with its registered prefix, falling back to `{uri}local`
    #[must_use]
    pub fn prefixed(&self, name: &QName) -> String {
        self.prefixes
            .iter()
            .find(|(_, uri)| uri.as_str() == name.namespace())
            .map_or_else(
                || name.to_string(),
                |(prefix, _)| format!("{prefix}:{}", name.local_name()),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NamespaceRegistry {
        NamespaceRegistry::new().with("ns", "http://example.com/model/1.0")
    }

    #[test]
    fn resolves_prefixed_name() {
        let q = registry().resolve("ns:title").unwrap();
        assert_eq!(q.namespace(), "http://example.com/model/1.0");
        assert_eq!(q.local_name(), "title");
        assert_eq!(q.to_string(), "{http://example.com/model/1.0}title");
    }

    #[test]
    fn resolves_full_form_without_registration() {
        let q = NamespaceRegistry::new().resolve("{urn:x}name").unwrap();
        assert_eq!(q, QName::new("urn:x", "name"));
    }

    #[test]
    fn unknown_prefix_is_reported() {
        let err = registry().resolve("zz:title").unwrap_err();
        assert_eq!(
            err,
            NamespaceError::UnknownPrefix {
                prefix: "zz".to_string()
            }
        );
    }

    #[test]
    fn malformed_names_are_rejected() {
        let reg = registry();
        for bad in ["title", ":title", "ns:", "{uri}", "{}title", "{uri title"] {
            assert!(
                matches!(reg.resolve(bad), Err(NamespaceError::Malformed(_))),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn prefixed_rendering() {
        let reg = registry();
        let q = reg.resolve("ns:title").unwrap();
        assert_eq!(reg.prefixed(&q), "ns:title");
        assert_eq!(reg.prefixed(&QName::new("urn:other", "x")), "{urn:other}x");
    }

    #[test]
    fn shared_uri_renders_first_registered_prefix() {
        let reg = NamespaceRegistry::new()
            .with("zz", "urn:shared")
            .with("aa", "urn:shared")
            .with("mm", "urn:shared");
        let q = QName::new("urn:shared", "title");
        for _ in 0..8 {
            assert_eq!(reg.clone().prefixed(&q), "zz:title");
        }

        // Re-registering keeps the original position.
        let reg = reg.with("zz", "urn:shared");
        assert_eq!(reg.prefixed(&q), "zz:title");
    }
}
