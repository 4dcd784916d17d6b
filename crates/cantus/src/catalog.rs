//! Built-in Cantus exports.
//!
//! Mirrors the data exports the Cantus database publishes: chants by day,
//! sources, sigla, feasts, genres, provenances and indexers.

use std::sync::Arc;

use cantus_views::{
    EntitySchema, ExportDefinition, FieldRegistry, FieldRegistryBuilder, FieldSpec, FilterChoice,
    FilterSpec, Operand, Operator, Result, SortKey,
};
use cantus_xml::NameTransform;
use chrono::DateTime;

/// Entity schemas of the Cantus database.
pub fn schemas() -> Vec<EntitySchema> {
    vec![
        EntitySchema::new("chant")
            .scalars([
                "nid",
                "title",
                "status",
                "type",
                "changed",
                "field_marginalia",
                "field_folio",
                "field_sequence",
                "field_position",
                "field_cantus_id",
                "field_mode",
                "field_differentia",
                "field_finalis",
                "body",
                "field_full_text_ms",
                "field_volpiano",
                "field_notes",
                "field_cao_concordances",
                "field_fulltext_proofread",
                "field_ms_fulltext_proofread",
                "field_volpiano_proofread",
                "field_melody_id",
                "field_image_link_chant",
                "field_siglum_chant",
            ])
            .reference("field_source", "source")
            .reference("field_office", "office")
            .reference("field_mc_genre", "genre")
            .reference("field_mc_feast", "feast")
            .reference("field_proofread_by", "user"),
        EntitySchema::new("source")
            .scalars([
                "nid",
                "title",
                "status",
                "type",
                "field_siglum",
                "field_provenance",
                "field_date",
                "field_summary",
                "field_liturgical_occasions",
                "body",
                "field_indexing_notes",
                "field_indexing_date",
                "field_image_link",
                "path",
            ])
            .reference("field_rism", "rism")
            .reference("field_provenance_tax", "provenance")
            .reference("field_century", "century")
            .reference("field_notation", "notation")
            .reference("field_editors", "user")
            .reference("uid", "user")
            .reference("field_proofreader", "user")
            .reference("field_segment", "segment")
            .reference("field_source_status_tax", "source_status"),
        EntitySchema::new("feast").scalars([
            "tid",
            "vid",
            "name",
            "description",
            "field_feastdate",
            "field_feastmonth",
            "field_feast_code",
        ]),
        EntitySchema::new("genre").scalars(["tid", "name", "description", "field_mass_office"]),
        EntitySchema::new("provenance").scalars(["tid", "name", "description"]),
        EntitySchema::new("indexer").scalars([
            "nid",
            "title",
            "status",
            "type",
            "field_indexer_institution",
            "field_indexer_city",
            "field_indexer_country",
            "field_family_name",
            "field_first_name",
            "path",
        ]),
    ]
}

/// Trimmed, tag-free text.
fn plain(path: &str, label: &str) -> Result<FieldSpec> {
    Ok(FieldSpec::parse(path, label)?.trim().strip_tags())
}

/// Like [`plain`], omitted when empty.
fn optional(path: &str, label: &str) -> Result<FieldSpec> {
    Ok(plain(path, label)?.hide_empty())
}

/// Unix timestamp to RFC 3339; anything else passes through.
fn iso8601(value: &str) -> String {
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| value.to_string())
}

const CHANT_FIELDS: &[(&str, &str)] = &[
    ("nid", "id"),
    ("title", "incipit"),
    ("nid", "drupal_path"),
    ("field_source.id", "source_id"),
    ("field_marginalia", "marginalia"),
    ("field_folio", "folio"),
    ("field_sequence", "sequence"),
    ("field_office.id", "office_id"),
    ("field_mc_genre.id", "genre_id"),
    ("field_position", "position"),
    ("field_cantus_id", "cantus_id"),
    ("field_mc_feast.id", "feast_id"),
    ("field_mode", "mode"),
    ("field_differentia", "differentia"),
    ("field_finalis", "finalis"),
    ("body", "full_text"),
    ("field_full_text_ms", "full_text_manuscript"),
    ("field_volpiano", "volpiano"),
    ("field_notes", "notes"),
    ("field_cao_concordances", "cao_concordances"),
    ("field_proofread_by.id", "proofreader_id"),
    ("field_fulltext_proofread", "proofread_fulltext"),
    ("field_ms_fulltext_proofread", "proofread_fulltext_manuscript"),
    ("field_volpiano_proofread", "proofread_volpiano"),
    ("field_melody_id", "melody_id"),
    ("field_image_link_chant", "image_link"),
    ("field_siglum_chant", "siglum"),
];

const SOURCE_FIELDS: &[(&str, &str)] = &[
    ("nid", "id"),
    ("title", "title"),
    ("field_rism.label", "rism"),
    ("field_siglum", "siglum"),
    ("field_provenance_tax.id", "provenance_id"),
    ("field_provenance", "provenance_detail"),
    ("field_date", "date"),
    ("field_century.id", "century_id"),
    ("field_notation.id", "notation_style_id"),
    ("field_editors.id", "editors"),
    ("uid.id", "indexers"),
    ("field_proofreader.id", "proofreaders"),
    ("field_segment.id", "segment_id"),
    ("field_source_status_tax.id", "source_status_id"),
    ("field_summary", "summary"),
    ("field_liturgical_occasions", "liturgical_occasions"),
    ("body", "description"),
    ("field_indexing_notes", "indexing_notes"),
    ("field_indexing_date", "indexing_date"),
    ("field_image_link", "image_link"),
    ("path", "drupal_path"),
];

fn register_chant(builder: &mut FieldRegistryBuilder) -> Result<()> {
    for &(path, label) in CHANT_FIELDS {
        let field = match label {
            "id" => plain(path, label)?,
            "drupal_path" => FieldSpec::parse(path, label)?
                .template("/chant/[nid]/")
                .hide_empty(),
            _ => optional(path, label)?,
        };
        builder.register("chant", field)?;
    }
    builder.register("chant", plain("changed", "updated")?.custom(iso8601))?;
    Ok(())
}

fn register_source(builder: &mut FieldRegistryBuilder) -> Result<()> {
    for &(path, label) in SOURCE_FIELDS {
        let field = if label == "id" {
            plain(path, label)?
        } else {
            optional(path, label)?
        };
        builder.register("source", field)?;
    }
    Ok(())
}

fn register_taxonomies(builder: &mut FieldRegistryBuilder) -> Result<()> {
    builder.register_all(
        "feast",
        [
            plain("name", "name")?,
            optional("description", "description")?,
            optional("field_feastdate", "date")?,
            optional("field_feast_code", "feast_code")?,
            plain("tid", "id")?,
        ],
    )?;
    builder.register_all(
        "genre",
        [
            plain("name", "name")?,
            plain("description", "description")?,
            plain("field_mass_office", "mass_or_office")?,
            plain("tid", "id")?,
        ],
    )?;
    builder.register_all(
        "provenance",
        [
            plain("name", "name")?,
            optional("description", "description")?,
            plain("tid", "id")?,
        ],
    )?;
    Ok(())
}

fn register_indexer(builder: &mut FieldRegistryBuilder) -> Result<()> {
    builder.register_all(
        "indexer",
        [
            FieldSpec::parse("title", "display_name")?.strip_tags(),
            plain("field_indexer_institution", "institution")?,
            plain("field_indexer_city", "city")?,
            plain("field_indexer_country", "country")?,
            plain("nid", "id")?,
            plain("field_family_name", "family_name")?,
            plain("field_first_name", "given_name")?,
            plain("path", "drupal_path")?,
        ],
    )?;
    Ok(())
}

/// Build the field registry for every Cantus entity type.
pub fn registry() -> Result<FieldRegistry> {
    let mut builder = FieldRegistry::builder();
    for schema in schemas() {
        builder.schema(schema);
    }
    register_chant(&mut builder)?;
    register_source(&mut builder)?;
    register_taxonomies(&mut builder)?;
    register_indexer(&mut builder)?;
    Ok(builder.build())
}

fn published(bundle: &str) -> [FilterSpec; 2] {
    [
        FilterSpec::equals("status", "1"),
        FilterSpec::equals("type", bundle),
    ]
}

/// Temporale (`1`, no fixed date) or sanctorale (`2`, fixed date).
fn feast_date_choice() -> FilterSpec {
    FilterSpec::grouped(
        "field_feastdate",
        "field_feastdate_value",
        [
            FilterChoice::new("1", Operator::Empty, Operand::None),
            FilterChoice::new("2", Operator::NotEmpty, Operand::None),
        ],
    )
}

/// Month picker. Item `1` is December; item `n` is month `n - 1`.
fn feast_month_choice() -> FilterSpec {
    let months = (1..=12).map(|item: u32| {
        let month = if item == 1 { 12 } else { item - 1 };
        FilterChoice::new(
            item.to_string(),
            Operator::Equals,
            Operand::Text(month.to_string()),
        )
    });
    FilterSpec::grouped("field_feastmonth", "field_feastmonth_value", months)
}

/// Build the built-in export definitions, sorted by id.
pub fn definitions(registry: &FieldRegistry) -> Result<Vec<ExportDefinition>> {
    let [status, chant_type] = published("chant");
    let chants = ExportDefinition::builder("chants")
        .description("Chants changed on the day given as YYYYMMDD")
        .entity_type("chant")
        .fields(CHANT_FIELDS.iter().map(|&(_, label)| label))
        .filter(status.clone())
        .filter(chant_type.clone())
        .filter(FilterSpec::full_date("changed", 1))
        .sort(SortKey::ascending("nid"))
        .item_tag("chant")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_chants-%1-value.xml")
        .build(registry)?;

    let chant_ids = ExportDefinition::builder("chant_ids")
        .description("Ids and change times of chants changed on the day given as YYYYMMDD")
        .entity_type("chant")
        .fields(["id", "updated"])
        .filter(status)
        .filter(chant_type)
        .filter(FilterSpec::full_date("changed", 1))
        .sort(SortKey::ascending("nid"))
        .root_tag("chants")
        .item_tag("chant")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_chant_ids-%1-value.xml")
        .build(registry)?;

    let [status, source_type] = published("source");
    let sources = ExportDefinition::builder("sources")
        .description("Published manuscript sources")
        .entity_type("source")
        .all_fields()
        .filter(status.clone())
        .filter(source_type.clone())
        .sort(SortKey::ascending("field_siglum"))
        .item_tag("source")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_sources.xml")
        .build(registry)?;

    let sigla = ExportDefinition::builder("sigla")
        .description("Source sigla")
        .entity_type("source")
        .inline_field(plain("field_siglum", "name")?)
        .inline_field(plain("title", "description")?)
        .field("id")
        .filter(status)
        .filter(source_type)
        .sort(SortKey::ascending("field_siglum"))
        .sort(SortKey::ascending("title"))
        .item_tag("siglum")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_sigla.xml")
        .build(registry)?;

    let feasts = ExportDefinition::builder("feasts")
        .description("Feasts, searchable by text, date and month")
        .entity_type("feast")
        .all_fields()
        .filter(FilterSpec::equals("vid", "6"))
        .filter(FilterSpec::combine(
            "combine",
            ["name", "description", "field_feast_code"],
        ))
        .filter(feast_date_choice())
        .filter(feast_month_choice())
        .item_tag("feast")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_feasts.xml")
        .build(registry)?;

    let genres = ExportDefinition::builder("genres")
        .description("Chant genres")
        .entity_type("genre")
        .all_fields()
        .sort(SortKey::ascending("name"))
        .item_tag("genre")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_genres.xml")
        .build(registry)?;

    let provenances = ExportDefinition::builder("provenances")
        .description("Source provenances")
        .entity_type("provenance")
        .all_fields()
        .item_tag("provenance")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_provenances.xml")
        .build(registry)?;

    let indexers = ExportDefinition::builder("indexers")
        .description("Indexers, searchable by name and location")
        .entity_type("indexer")
        .all_fields()
        .filter(FilterSpec::equals("type", "indexer"))
        .filter(FilterSpec::combine(
            "combine",
            [
                "title",
                "field_indexer_institution",
                "field_indexer_city",
                "field_indexer_country",
            ],
        ))
        .sort(SortKey::ascending("field_family_name"))
        .sort(SortKey::ascending("field_first_name"))
        .item_tag("indexer")
        .name_transform(NameTransform::Underline)
        .file_name("list_of_indexers.xml")
        .build(registry)?;

    let mut all = vec![
        chants,
        chant_ids,
        sources,
        sigla,
        feasts,
        genres,
        provenances,
        indexers,
    ];
    all.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(all)
}

/// The registry and every built-in export, shareable across threads.
#[derive(Debug, Clone)]
pub struct Catalog {
    registry: Arc<FieldRegistry>,
    exports: Vec<Arc<ExportDefinition>>,
}

impl Catalog {
    /// Build the Cantus catalog.
    pub fn cantus() -> Result<Self> {
        let registry = registry()?;
        let exports = definitions(&registry)?.into_iter().map(Arc::new).collect();
        Ok(Self {
            registry: Arc::new(registry),
            exports,
        })
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Look up an export by id.
    pub fn get(&self, id: &str) -> Option<&Arc<ExportDefinition>> {
        self.exports
            .binary_search_by(|e| e.id().cmp(id))
            .ok()
            .map(|i| &self.exports[i])
    }

    /// Every export, sorted by id.
    pub fn exports(&self) -> &[Arc<ExportDefinition>] {
        &self.exports
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.exports.iter().map(|e| e.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_common::{EntityRef, Record};
    use cantus_views::{ContextArgs, Projector};

    #[test]
    fn test_catalog_builds() {
        let catalog = Catalog::cantus().unwrap();
        assert_eq!(
            catalog.ids().collect::<Vec<_>>(),
            [
                "chant_ids",
                "chants",
                "feasts",
                "genres",
                "indexers",
                "provenances",
                "sigla",
                "sources"
            ]
        );
        assert!(catalog.get("chants").is_some());
        assert!(catalog.get("missing").is_none());
        assert_eq!(catalog.registry().list_for("chant").len(), 28);
    }

    #[test]
    fn test_file_names() {
        let catalog = Catalog::cantus().unwrap();
        let day = ContextArgs::positional(["20230101"]);
        let name = |id: &str| catalog.get(id).unwrap().file_name(&day);

        assert_eq!(name("chants"), "list_of_chants-20230101.xml");
        assert_eq!(name("chant_ids"), "list_of_chant_ids-20230101.xml");
        assert_eq!(name("sigla"), "list_of_sigla.xml");
        assert_eq!(
            catalog.get("chants").unwrap().file_name(&ContextArgs::new()),
            "list_of_chants-all.xml"
        );
    }

    #[test]
    fn test_chant_projection() {
        let catalog = Catalog::cantus().unwrap();
        let chants = catalog.get("chants").unwrap();
        let record = Record::new("chant", 42)
            .with("nid", 42i64)
            .with("title", " <b>Ave</b> Maria ")
            .with("field_mc_genre", EntityRef::new("genre", 7))
            .with("field_volpiano", "1---g--h");

        let row = Projector::new(&cantus_views::NoResolver).project(&record, chants.fields());
        assert_eq!(
            row.pairs(),
            [
                ("id", "42"),
                ("incipit", "Ave Maria"),
                ("drupal_path", "/chant/42/"),
                ("genre_id", "7"),
                ("volpiano", "1---g--h"),
            ]
        );
    }

    #[test]
    fn test_updated_is_rfc3339() {
        assert_eq!(iso8601("1672531200"), "2023-01-01T00:00:00+00:00");
        assert_eq!(iso8601("soon"), "soon");
    }

    #[test]
    fn test_feast_inputs() {
        let catalog = Catalog::cantus().unwrap();
        assert_eq!(
            catalog.get("feasts").unwrap().exposed_inputs(),
            ["combine", "field_feastdate_value", "field_feastmonth_value"]
        );
    }

    #[test]
    fn test_feast_month_items() {
        let filter = feast_month_choice();
        let month = |item: &str| filter.choice(item).map(|c| c.operand.clone());
        assert_eq!(month("1"), Some(Operand::Text("12".into())));
        assert_eq!(month("2"), Some(Operand::Text("1".into())));
        assert_eq!(month("12"), Some(Operand::Text("11".into())));
        assert_eq!(month("13"), None);
    }
}
