use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use cantus_common::{CancellationToken, ErrorKind, Record};
use cantus_pipeline::{
    DataSource, Error, ExportPipeline, MemorySource, ParallelExporter, RecordStream, SourceError,
};
use cantus_views::{
    ContextArgs, EntitySchema, ExportDefinition, FieldRegistry, FieldSpec, FilterSpec,
    QueryRequest, SortKey,
};
use cantus_xml::{parse_str, NameTransform};

// 2023-01-01T00:00:00Z
const NEW_YEAR: i64 = 1_672_531_200;

fn registry() -> FieldRegistry {
    let mut builder = FieldRegistry::builder();
    builder
        .schema(
            EntitySchema::new("chant")
                .scalars(["nid", "title", "changed", "status", "type"])
                .reference("genre", "genre"),
        )
        .schema(EntitySchema::new("genre").scalars(["tid", "name"]));
    builder
        .register("chant", FieldSpec::property("nid"))
        .unwrap()
        .register("chant", FieldSpec::property("title").trim())
        .unwrap()
        .register("chant", FieldSpec::parse("genre.label", "genre").unwrap().hide_empty())
        .unwrap()
        .register("genre", FieldSpec::parse("tid", "id").unwrap())
        .unwrap();
    builder.build()
}

fn chants(registry: &FieldRegistry) -> ExportDefinition {
    ExportDefinition::builder("chants")
        .entity_type("chant")
        .all_fields()
        .filter(FilterSpec::equals("status", "1"))
        .filter(FilterSpec::equals("type", "chant"))
        .filter(FilterSpec::full_date("changed", 1))
        .sort(SortKey::ascending("nid"))
        .item_tag("chant")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_chants-%1-value.xml")
        .build(registry)
        .unwrap()
}

fn chant(id: u64, changed: i64, status: i64) -> Record {
    Record::new("chant", id)
        .with("nid", id as i64)
        .with("title", format!(" Chant {id} "))
        .with("changed", changed)
        .with("status", status)
        .with("type", "chant")
}

fn source() -> MemorySource {
    let mut source = MemorySource::from_records([
        chant(3, NEW_YEAR + 86_400, 1),
        chant(1, NEW_YEAR, 1),
        chant(2, NEW_YEAR + 86_399, 1),
        chant(4, NEW_YEAR + 10, 0),
    ]);
    source.insert(Record::new("genre", 10).with("tid", 10i64).with("name", "Antiphon"));
    source.insert(
        Record::new("chant", 5)
            .with("nid", 5i64)
            .with("title", "Ave")
            .with("changed", NEW_YEAR + 5)
            .with("status", 1i64)
            .with("type", "feast"),
    );
    source
}

fn item_ids(path: &Path) -> Vec<String> {
    let xml = fs::read_to_string(path).unwrap();
    let doc = parse_str(&xml).unwrap();
    doc.items
        .iter()
        .map(|item| item.row.get("nid").unwrap().to_string())
        .collect()
}

fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[test]
fn test_chants_for_one_day() {
    let registry = registry();
    let definition = chants(&registry);
    let source = source();
    let dir = tempfile::tempdir().unwrap();

    let pipeline = ExportPipeline::new(&source, &source, dir.path());
    let output = pipeline
        .run(&definition, &ContextArgs::positional(["20230101"]))
        .unwrap();

    assert_eq!(output.path, dir.path().join("list_of_chants-20230101.xml"));
    assert_eq!(output.rows, 2);
    assert_eq!(item_ids(&output.path), ["1", "2"]);

    let xml = fs::read_to_string(&output.path).unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("<chant><nid>1</nid><title>Chant 1</title></chant>"));
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn test_invalid_date_fails_open() {
    let registry = registry();
    let definition = chants(&registry);
    let source = source();
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ExportPipeline::new(&source, &source, dir.path());

    let invalid = pipeline
        .run(&definition, &ContextArgs::positional(["notadate"]))
        .unwrap();
    let missing = pipeline.run(&definition, &ContextArgs::new()).unwrap();

    assert_eq!(item_ids(&invalid.path), ["1", "2", "3"]);
    assert_eq!(item_ids(&invalid.path), item_ids(&missing.path));
    assert_eq!(missing.path, dir.path().join("list_of_chants-all.xml"));
}

#[test]
fn test_file_name_cannot_escape_output_dir() {
    let registry = registry();
    let definition = chants(&registry);
    let source = source();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pipeline = ExportPipeline::new(&source, &source, &out);

    let output = pipeline
        .run(&definition, &ContextArgs::positional(["../escape"]))
        .unwrap();
    assert_eq!(output.path.parent(), Some(out.as_path()));
    assert!(!dir.path().join("escape").exists());
}

#[test]
fn test_empty_result() {
    let registry = registry();
    let definition = chants(&registry);
    let source = MemorySource::new();
    let mut buf = Vec::new();

    let pipeline = ExportPipeline::new(&source, &source, ".");
    let rows = pipeline
        .write_to(&definition, &ContextArgs::new(), &mut buf)
        .unwrap();
    assert_eq!(rows, 0);
    let xml = String::from_utf8(buf).unwrap();
    assert!(xml.contains("<chants></chants>"));
}

#[test]
fn test_reference_labels_resolved() {
    let registry = registry();
    let definition = chants(&registry);
    let mut source = source();
    source.insert(
        chant(6, NEW_YEAR, 1).with("genre", cantus_common::EntityRef::new("genre", 10)),
    );
    let mut buf = Vec::new();

    ExportPipeline::new(&source, &source, ".")
        .write_to(&definition, &ContextArgs::positional(["20230101"]), &mut buf)
        .unwrap();
    let xml = String::from_utf8(buf).unwrap();
    assert!(xml.contains("<nid>6</nid><title>Chant 6</title><genre>Antiphon</genre>"));
}

#[test]
fn test_raw_field_written_verbatim() {
    let registry = registry();
    let definition = ExportDefinition::builder("markup")
        .entity_type("chant")
        .inline_field(FieldSpec::property("title").raw())
        .inline_field(FieldSpec::parse("title", "escaped").unwrap())
        .root_tag("chants")
        .item_tag("chant")
        .build(&registry)
        .unwrap();
    let source = MemorySource::from_records([
        Record::new("chant", 1).with("title", "<i>Ave</i> &amp; vale")
    ]);
    let mut buf = Vec::new();

    ExportPipeline::new(&source, &source, ".")
        .write_to(&definition, &ContextArgs::new(), &mut buf)
        .unwrap();
    let xml = String::from_utf8(buf).unwrap();
    assert!(xml.contains(
        "<chant><title><i>Ave</i> &amp; vale</title>\
         <escaped>&lt;i&gt;Ave&lt;/i&gt; &amp;amp; vale</escaped></chant>"
    ));
}

#[test]
fn test_concurrent_runs_publish_one_file() {
    let registry = registry();
    let definition = chants(&registry);
    let source = MemorySource::from_records((1..=200).map(|id| chant(id, NEW_YEAR, 1)));
    let dir = tempfile::tempdir().unwrap();
    let args = ContextArgs::positional(["20230101"]);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                ExportPipeline::new(&source, &source, dir.path())
                    .run(&definition, &args)
                    .unwrap();
            });
        }
    });

    let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(item_ids(&dir.path().join("list_of_chants-20230101.xml")).len(), 200);
}

struct FailingSource {
    after: usize,
}

impl DataSource for FailingSource {
    fn fetch(&self, _request: &QueryRequest) -> Result<RecordStream<'_>, SourceError> {
        let ok = (1..=self.after as u64).map(|id| Ok(chant(id, NEW_YEAR, 1)));
        let fail = std::iter::once(Err(SourceError::Backend("connection reset".into())));
        Ok(Box::new(ok.chain(fail)))
    }
}

#[test]
fn test_source_error_leaves_no_file() {
    let registry = registry();
    let definition = chants(&registry);
    let source = FailingSource { after: 3 };
    let resolver = MemorySource::new();
    let dir = tempfile::tempdir().unwrap();

    let err = ExportPipeline::new(&source, &resolver, dir.path())
        .run(&definition, &ContextArgs::new())
        .unwrap_err();
    assert!(matches!(err, Error::Source(SourceError::Backend(_))));
    assert_eq!(err.kind(), ErrorKind::DataSource);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_cancelled_before_fetch() {
    let registry = registry();
    let definition = chants(&registry);
    let source = source();
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = ExportPipeline::new(&source, &source, dir.path())
        .with_cancellation(token)
        .run(&definition, &ContextArgs::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

struct CancellingSource {
    token: CancellationToken,
}

impl DataSource for CancellingSource {
    fn fetch(&self, _request: &QueryRequest) -> Result<RecordStream<'_>, SourceError> {
        let token = self.token.clone();
        Ok(Box::new((1..=10u64).map(move |id| {
            if id == 3 {
                token.cancel();
            }
            Ok(chant(id, NEW_YEAR, 1))
        })))
    }
}

#[test]
fn test_cancelled_between_records() {
    let registry = registry();
    let definition = chants(&registry);
    let token = CancellationToken::new();
    let source = CancellingSource {
        token: token.clone(),
    };
    let resolver = MemorySource::new();
    let dir = tempfile::tempdir().unwrap();

    let err = ExportPipeline::new(&source, &resolver, dir.path())
        .with_cancellation(token)
        .run(&definition, &ContextArgs::new())
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_strict_filter_rejects_before_writing() {
    let registry = registry();
    let definition = ExportDefinition::builder("chant_ids")
        .entity_type("chant")
        .field("nid")
        .filter(FilterSpec::full_date("changed", 1).strict())
        .build(&registry)
        .unwrap();
    let source = source();
    let dir = tempfile::tempdir().unwrap();

    let err = ExportPipeline::new(&source, &source, dir.path())
        .run(&definition, &ContextArgs::positional(["notadate"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_parallel_export() {
    let registry = registry();
    let chants = chants(&registry);
    let genres = ExportDefinition::builder("genres")
        .entity_type("genre")
        .all_fields()
        .build(&registry)
        .unwrap();
    let failing = ExportDefinition::builder("strict")
        .entity_type("chant")
        .field("nid")
        .filter(FilterSpec::full_date("changed", 1).strict())
        .build(&registry)
        .unwrap();

    let source = source();
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ExportPipeline::new(&source, &source, dir.path());
    let calls = AtomicUsize::new(0);

    let report = ParallelExporter::new(&pipeline).export_all(
        [&chants, &genres, &failing],
        &ContextArgs::positional(["bogus"]),
        |done, total| {
            assert!(done <= total);
            calls.fetch_add(1, Ordering::Relaxed);
        },
    );

    assert_eq!(report.stats.exported, 2);
    assert_eq!(report.stats.errors, 1);
    assert!(!report.stats.is_complete());
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(report.outputs[0].export, "chants");
    assert_eq!(report.outputs[1].path, dir.path().join("genres.xml"));
    assert_eq!(report.failures[0].0, "strict");
}
