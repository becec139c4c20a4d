//! Attribute mapping table
//!
//! Built once from configuration and shared read-only by every write.
//! Entries whose attribute cannot be resolved are dropped with a warning.
//! Iteration order is configuration order.

use crate::config::MappingEntry;
use crate::convert::ConverterChain;
use crate::extract::PropertyValueExtractor;
use indexmap::IndexMap;
use mdw_repo::{NamespaceRegistry, QName, Value};
use std::collections::BTreeMap;

/// Target property name to converted value, in mapping order
pub type PropertyMap = IndexMap<String, Value>;

/// Qualified attribute name to artifact property name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMapping {
    entries: IndexMap<QName, String>,
}

impl AttributeMapping {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve configured entries against `namespaces`
    ///
    /// An attribute listed twice keeps its first position and its last
    /// target property.
    #[must_use]
    pub fn from_entries(entries: &[MappingEntry], namespaces: &NamespaceRegistry) -> Self {
        let mut mapping = Self::new();
        for entry in entries {
            match namespaces.resolve(&entry.attribute) {
                Ok(name) => {
                    if let Some(previous) = mapping.entries.insert(name, entry.property.clone()) {
                        tracing::debug!(
                            attribute = %entry.attribute,
                            previous = %previous,
                            property = %entry.property,
                            "attribute mapped more than once, last mapping wins"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        attribute = %entry.attribute,
                        property = %entry.property,
                        %error,
                        "dropping unresolvable mapping entry"
                    );
                }
            }
        }
        mapping
    }

    /// Add one resolved entry
    #[must_use]
    pub fn with(mut self, attribute: QName, property: impl Into<String>) -> Self {
        self.entries.insert(attribute, property.into());
        self
    }

    /// Target property for an attribute
    #[inline]
    #[must_use]
    pub fn target(&self, attribute: &QName) -> Option<&str> {
        self.entries.get(attribute).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.entries.iter().map(|(name, property)| (name, property.as_str()))
    }

    /// Derive the property map for one write
    ///
    /// Each mapped attribute present on the node is extracted and converted;
    /// an attribute whose extraction yields nothing is dropped. Unmapped
    /// attributes never reach the map.
    #[must_use]
    pub fn property_map(
        &self,
        properties: &BTreeMap<QName, Value>,
        extractor: &dyn PropertyValueExtractor,
        converters: &ConverterChain,
    ) -> PropertyMap {
        let mut map = PropertyMap::with_capacity(self.entries.len());

        for (name, target) in &self.entries {
            let Some(raw) = properties.get(name) else {
                continue;
            };
            match extractor.extract(raw) {
                Some(value) => {
                    map.insert(target.clone(), converters.convert(value));
                }
                None => tracing::trace!(attribute = %name, "no concrete value, skipping"),
            }
        }

        for (name, value) in properties {
            if !self.entries.contains_key(name) {
                tracing::trace!(attribute = %name, %value, "attribute is not mapped, ignoring");
            }
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DefaultValueExtractor;
    use proptest::collection::{btree_map, vec};
    use proptest::prelude::*;

    fn ns() -> NamespaceRegistry {
        NamespaceRegistry::new().with("cm", "urn:cm")
    }

    #[test]
    fn unresolvable_entries_are_dropped() {
        let mapping = AttributeMapping::from_entries(
            &[
                MappingEntry::new("Title", "cm:title"),
                MappingEntry::new("Ghost", "nope:title"),
                MappingEntry::new("Bad", "no-colon"),
                MappingEntry::new("Author", "{urn:cm}author"),
            ],
            &ns(),
        );

        let targets: Vec<_> = mapping.iter().map(|(_, p)| p).collect();
        assert_eq!(targets, ["Title", "Author"]);
    }

    #[test]
    fn property_map_follows_mapping_order() {
        let mapping = AttributeMapping::new()
            .with(QName::new("urn:cm", "title"), "Title")
            .with(QName::new("urn:cm", "author"), "Author")
            .with(QName::new("urn:cm", "subject"), "Subject");

        let mut props = BTreeMap::new();
        props.insert(QName::new("urn:cm", "subject"), Value::text("s"));
        props.insert(QName::new("urn:cm", "author"), Value::text("a"));
        props.insert(QName::new("urn:cm", "title"), Value::Null);
        props.insert(QName::new("urn:cm", "owner"), Value::text("o"));

        let map = mapping.property_map(&props, &DefaultValueExtractor::new(), &ConverterChain::new());
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Author", "Subject"]);
    }

    proptest! {
        #[test]
        fn unmapped_attributes_never_appear(
            present in btree_map("[a-f]", "[a-z]{1,4}", 0..6),
            mapped in vec("[a-f]", 0..6),
        ) {
            let mapping = mapped.iter().fold(AttributeMapping::new(), |m, local| {
                m.with(QName::new("urn:cm", local.clone()), format!("P-{local}"))
            });
            let props: BTreeMap<QName, Value> = present
                .iter()
                .map(|(k, v)| (QName::new("urn:cm", k.clone()), Value::text(v.clone())))
                .collect();

            let map = mapping.property_map(&props, &DefaultValueExtractor::new(), &ConverterChain::new());

            for (target, value) in &map {
                let local = target.trim_start_matches("P-");
                prop_assert!(mapped.iter().any(|m| m == local));
                let expected = present.get(local).map(|s| Value::text(s.clone()));
                prop_assert_eq!(expected.as_ref(), Some(value));
            }
            let expected = present.keys().filter(|k| mapped.contains(k)).count();
            prop_assert_eq!(map.len(), expected);
        }
    }
}
