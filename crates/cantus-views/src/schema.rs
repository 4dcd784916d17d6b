//! Entity schemas: which properties an entity type exposes.

use std::hash::BuildHasherDefault;

use hashbrown::HashMap as FastHashMap;
use rustc_hash::FxHasher;

pub(crate) type FxHashMap<K, V> = FastHashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Kind of a schema property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Plain value (text, number, flag, timestamp).
    Scalar,
    /// Reference to a record of the `target` entity type.
    Reference { target: String },
}

/// The properties an entity type exposes to exports.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    entity_type: String,
    properties: FxHashMap<String, PropertyKind>,
}

impl EntitySchema {
    /// Create a schema with no properties.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: FxHashMap::default(),
        }
    }

    /// Declare a scalar property.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), PropertyKind::Scalar);
        self
    }

    /// Declare several scalar properties.
    pub fn scalars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.properties.insert(name.into(), PropertyKind::Scalar);
        }
        self
    }

    /// Declare a reference property pointing at `target` records.
    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties.insert(
            name.into(),
            PropertyKind::Reference {
                target: target.into(),
            },
        );
        self
    }

    /// Entity type described by this schema.
    #[inline]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Kind of a property, `None` when undeclared.
    #[inline]
    pub fn kind(&self, name: &str) -> Option<&PropertyKind> {
        self.properties.get(name)
    }

    /// Whether the property is declared.
    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Declared property names, sorted.
    pub fn property_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.properties.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
