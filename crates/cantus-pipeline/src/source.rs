//! Data sources feeding the export pipeline.

use std::fs::File;
use std::hash::BuildHasherDefault;
use std::io::{BufReader, Read};
use std::path::Path;

use cantus_common::{EntityRef, Record, Value};
use cantus_views::{EntityResolver, QueryRequest};
use hashbrown::HashMap as FastHashMap;
use rustc_hash::FxHasher;
use serde::Deserialize;

use crate::error::SourceError;

type FxHashMap<K, V> = FastHashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Records produced by a data source, one at a time.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, SourceError>> + Send + 'a>;

/// Something that can answer a [`QueryRequest`].
///
/// Implementations apply the request's predicate, sort keys and paging.
pub trait DataSource: Send + Sync {
    fn fetch(&self, request: &QueryRequest) -> Result<RecordStream<'_>, SourceError>;
}

/// In-memory data source, also usable as an [`EntityResolver`].
#[derive(Debug, Default)]
pub struct MemorySource {
    by_type: FxHashMap<String, Vec<Record>>,
    index: FxHashMap<(String, u64), usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source holding `records`.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let mut source = Self::new();
        for record in records {
            source.insert(record);
        }
        source
    }

    /// Add a record, replacing any record with the same type and id.
    pub fn insert(&mut self, record: Record) {
        let key = (record.entity_type().to_string(), record.id());
        let records = self.by_type.entry(key.0.clone()).or_default();
        match self.index.get(&key) {
            Some(&i) => records[i] = record,
            None => {
                self.index.insert(key, records.len());
                records.push(record);
            }
        }
    }

    /// Look up one record.
    pub fn get(&self, entity_type: &str, id: u64) -> Option<&Record> {
        let i = *self.index.get(&(entity_type.to_string(), id))?;
        self.by_type.get(entity_type)?.get(i)
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Load records from a JSON file.
    ///
    /// See [`MemorySource::from_json_reader`] for the format.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_reader(BufReader::new(file))
    }

    /// Load records from JSON.
    ///
    /// Accepts `{"records": [...]}` or a bare array of
    /// `{"entity_type", "id", "properties"}` objects. A property object
    /// `{"entity": "genre", "id": 3}` is a reference.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, SourceError> {
        let file: RecordFile =
            serde_json::from_reader(reader).map_err(|e| SourceError::Parse(e.to_string()))?;
        let raw = match file {
            RecordFile::Wrapped { records } => records,
            RecordFile::Bare(records) => records,
        };

        let mut source = Self::new();
        for entry in raw {
            let mut record = Record::new(entry.entity_type, entry.id);
            for (name, value) in entry.properties {
                let value = convert_value(&value).map_err(|reason| {
                    SourceError::Parse(format!(
                        "{}:{} property {name:?}: {reason}",
                        record.entity_type(),
                        record.id()
                    ))
                })?;
                record.set(name, value);
            }
            source.insert(record);
        }
        Ok(source)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        Self::from_json_reader(json.as_bytes())
    }
}

impl DataSource for MemorySource {
    fn fetch(&self, request: &QueryRequest) -> Result<RecordStream<'_>, SourceError> {
        let Some(records) = self.by_type.get(&request.entity_type) else {
            return Ok(Box::new(std::iter::empty()));
        };

        let selected = request.select(records);
        Ok(Box::new(selected.into_iter().map(|r| Ok(r.clone()))))
    }
}

impl EntityResolver for MemorySource {
    fn label(&self, reference: &EntityRef) -> Option<String> {
        self.get(&reference.entity_type, reference.id)?.label()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Wrapped { records: Vec<RawRecord> },
    Bare(Vec<RawRecord>),
}

#[derive(Deserialize)]
struct RawRecord {
    entity_type: String,
    id: u64,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

fn convert_value(value: &serde_json::Value) -> Result<Value, String> {
    use serde_json::Value as Json;

    Ok(match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Text(n.to_string()),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(convert_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Json::Object(map) => match (map.get("entity"), map.get("id")) {
            (Some(Json::String(entity_type)), Some(id)) => {
                let id = id.as_u64().ok_or("reference id must be a non-negative integer")?;
                Value::Reference(EntityRef::new(entity_type.as_str(), id))
            }
            _ => return Err("objects must be references like {\"entity\": .., \"id\": ..}".into()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_views::{ContextArgs, FilterSpec, QueryBuilder, SortKey};

    const JSON: &str = r#"{
        "records": [
            {"entity_type": "genre", "id": 10, "properties": {"name": "Antiphon"}},
            {"entity_type": "chant", "id": 2, "properties": {
                "title": "Ave", "status": 1, "genre": {"entity": "genre", "id": 10}
            }},
            {"entity_type": "chant", "id": 1, "properties": {
                "title": "Salve", "status": 0, "office": ["M", "V"]
            }}
        ]
    }"#;

    fn collect(stream: RecordStream<'_>) -> Vec<u64> {
        stream.map(|r| r.unwrap().id()).collect()
    }

    #[test]
    fn test_load_json() {
        let source = MemorySource::from_json_str(JSON).unwrap();
        assert_eq!(source.len(), 3);

        let chant = source.get("chant", 2).unwrap();
        assert_eq!(
            chant.get("genre").and_then(Value::as_reference),
            Some(&EntityRef::new("genre", 10))
        );
        assert_eq!(
            source.label(&EntityRef::new("genre", 10)).as_deref(),
            Some("Antiphon")
        );
        assert_eq!(source.label(&EntityRef::new("genre", 99)), None);
    }

    #[test]
    fn test_load_bare_array() {
        let source =
            MemorySource::from_json_str(r#"[{"entity_type": "feast", "id": 1}]"#).unwrap();
        assert!(source.get("feast", 1).is_some());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            MemorySource::from_json_str("{\"records\": 1}"),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(
            MemorySource::from_json_str(
                r#"[{"entity_type": "feast", "id": 1, "properties": {"x": {"a": 1}}}]"#
            ),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_fetch_filters_sorts_pages() {
        let source = MemorySource::from_json_str(JSON).unwrap();

        let request = QueryBuilder::new("chant")
            .sort(SortKey::ascending("title"))
            .build(&ContextArgs::new())
            .unwrap();
        assert_eq!(collect(source.fetch(&request).unwrap()), [2, 1]);

        let published = FilterSpec::equals("status", "1");
        let request = QueryBuilder::new("chant")
            .filter(&published)
            .build(&ContextArgs::new())
            .unwrap();
        assert_eq!(collect(source.fetch(&request).unwrap()), [2]);

        let mut request = QueryRequest::all("chant");
        request.offset = 1;
        assert_eq!(collect(source.fetch(&request).unwrap()), [1]);

        assert!(collect(source.fetch(&QueryRequest::all("sigla")).unwrap()).is_empty());
    }

    #[test]
    fn test_insert_replaces() {
        let mut source = MemorySource::new();
        source.insert(Record::new("feast", 1).with("name", "a"));
        source.insert(Record::new("feast", 1).with("name", "b"));
        assert_eq!(source.len(), 1);
        assert_eq!(source.get("feast", 1).unwrap().get_text("name"), "b");
    }
}
