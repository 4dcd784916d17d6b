//! Projection of records into output rows.

use cantus_common::{EntityRef, Record, Value};
use cantus_xml::{Encoding, Row};

use crate::field::{FieldSpec, SourcePath};

/// Looks up display labels of referenced entities.
pub trait EntityResolver: Send + Sync {
    /// Label of the referenced entity, `None` when it cannot be found.
    fn label(&self, reference: &EntityRef) -> Option<String>;
}

/// Resolver that knows no entities; every label is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl EntityResolver for NoResolver {
    fn label(&self, _reference: &EntityRef) -> Option<String> {
        None
    }
}

/// Builds one [`Row`] per record from a list of field specs.
#[derive(Clone, Copy)]
pub struct Projector<'a> {
    resolver: &'a dyn EntityResolver,
}

impl<'a> Projector<'a> {
    pub fn new(resolver: &'a dyn EntityResolver) -> Self {
        Self { resolver }
    }

    /// Project `record` through `fields`.
    ///
    /// Entries follow field order. Fields hiding empty values are omitted
    /// when their final value is empty; other empty fields are kept.
    pub fn project(&self, record: &Record, fields: &[FieldSpec]) -> Row {
        let mut row = Row::with_capacity(fields.len());
        for field in fields {
            let raw = self.extract(record, field.source());
            let value = field.apply(&raw, record);
            if value.is_empty() && field.hides_empty() {
                continue;
            }
            let encoding = if field.encodes_entities() {
                Encoding::Escaped
            } else {
                Encoding::Raw
            };
            row.push_with(field.label(), value, encoding);
        }
        row
    }

    /// Raw text at `source`, empty when absent.
    pub fn extract(&self, record: &Record, source: &SourcePath) -> String {
        let Some(value) = record.get(source.property()) else {
            return String::new();
        };

        match source {
            SourcePath::Property(_) => value.render().into_owned(),
            SourcePath::ReferenceId(_) => join(value, |item| match item.as_reference() {
                Some(r) => Some(r.id.to_string()),
                None => Some(item.render().into_owned()),
            }),
            SourcePath::ReferenceLabel(_) => {
                join(value, |item| item.as_reference().and_then(|r| self.resolver.label(r)))
            }
        }
    }
}

fn join(value: &Value, f: impl Fn(&Value) -> Option<String>) -> String {
    value
        .items()
        .filter(|item| !item.is_empty())
        .filter_map(f)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
