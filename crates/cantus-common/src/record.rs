//! Entity records as delivered by a data source.

use indexmap::IndexMap;

use crate::Value;

/// An entity instance: a typed id plus an ordered set of named properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity_type: String,
    id: u64,
    properties: IndexMap<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new(entity_type: impl Into<String>, id: u64) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            properties: IndexMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Entity type of this record.
    #[inline]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Identifier within the entity type.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Look up a property by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Look up a property and render it, empty when missing.
    pub fn get_text(&self, name: &str) -> String {
        self.get(name).map(|v| v.render().into_owned()).unwrap_or_default()
    }

    /// Human-readable label: the `title` property, else `name`.
    pub fn label(&self) -> Option<String> {
        ["title", "name"]
            .iter()
            .filter_map(|key| self.get(key))
            .find(|v| !v.is_empty())
            .map(|v| v.render().into_owned())
    }

    /// Iterate over properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}
