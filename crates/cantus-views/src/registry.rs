//! Registry of the fields each entity type can export.

use crate::field::{FieldSpec, SourcePath};
use crate::schema::{EntitySchema, FxHashMap, PropertyKind};
use crate::{Error, Result};

/// Collects schemas and field specs, validating each registration.
#[derive(Debug, Default)]
pub struct FieldRegistryBuilder {
    schemas: FxHashMap<String, EntitySchema>,
    fields: FxHashMap<String, Vec<FieldSpec>>,
}

impl FieldRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the properties of an entity type.
    ///
    /// Redeclaring a type replaces its schema; already registered fields
    /// are kept.
    pub fn schema(&mut self, schema: EntitySchema) -> &mut Self {
        self.schemas.insert(schema.entity_type().to_string(), schema);
        self
    }

    /// Register a field for `entity_type`.
    ///
    /// Fails when the type has no schema, the label is already taken, the
    /// source path or a template token names an undeclared property, or a
    /// reference path starts at a scalar property.
    pub fn register(&mut self, entity_type: &str, field: FieldSpec) -> Result<&mut Self> {
        let schema = self
            .schemas
            .get(entity_type)
            .ok_or_else(|| Error::UnknownEntityType(entity_type.to_string()))?;
        validate_field(schema, &field)?;

        let fields = self.fields.entry(entity_type.to_string()).or_default();
        if fields.iter().any(|f| f.label() == field.label()) {
            return Err(Error::DuplicateLabel {
                scope: format!("entity type {entity_type:?}"),
                label: field.label().to_string(),
            });
        }
        fields.push(field);
        Ok(self)
    }

    /// Register several fields, stopping at the first failure.
    pub fn register_all<I>(&mut self, entity_type: &str, fields: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = FieldSpec>,
    {
        for field in fields {
            self.register(entity_type, field)?;
        }
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> FieldRegistry {
        FieldRegistry {
            schemas: self.schemas,
            fields: self.fields,
        }
    }
}

/// Check a field against the schema of the entity type it reads from.
pub(crate) fn validate_field(schema: &EntitySchema, field: &FieldSpec) -> Result<()> {
    let unknown = |path: String| Error::UnknownSourcePath {
        entity_type: schema.entity_type().to_string(),
        path,
    };

    let source = field.source();
    match schema.kind(source.property()) {
        None => return Err(unknown(source.to_string())),
        Some(PropertyKind::Scalar) if source.follows_reference() => {
            return Err(Error::NotAReference {
                entity_type: schema.entity_type().to_string(),
                property: source.property().to_string(),
            });
        }
        Some(_) => {}
    }

    if let Some(token) = field.template_properties().find(|p| !schema.has(p)) {
        return Err(unknown(format!("[{token}]")));
    }
    Ok(())
}

/// Read-only catalogue of exportable fields per entity type.
///
/// Safe to share between threads once built.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    schemas: FxHashMap<String, EntitySchema>,
    fields: FxHashMap<String, Vec<FieldSpec>>,
}

impl FieldRegistry {
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::new()
    }

    /// Fields registered for `entity_type` in registration order.
    ///
    /// Unknown types have no fields.
    pub fn list_for(&self, entity_type: &str) -> &[FieldSpec] {
        self.fields.get(entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Field registered under `label` for `entity_type`.
    pub fn field(&self, entity_type: &str, label: &str) -> Option<&FieldSpec> {
        self.list_for(entity_type).iter().find(|f| f.label() == label)
    }

    /// Schema of an entity type.
    pub fn schema(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity_type)
    }

    /// Entity types with a schema, sorted.
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl SourcePath {
    /// Entity type a reference path points at, if the schema declares one.
    pub fn target<'s>(&self, schema: &'s EntitySchema) -> Option<&'s str> {
        match schema.kind(self.property()) {
            Some(PropertyKind::Reference { target }) if self.follows_reference() => {
                Some(target.as_str())
            }
            _ => None,
        }
    }
}
