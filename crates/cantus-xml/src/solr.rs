//! Conversion of export documents into Solr update XML.
//!
//! Every item becomes a `<doc>` inside an `<add>` root:
//!
//! ```xml
//! <add><doc><field name="type">chant</field><field name="id">…</field></doc></add>
//! ```
//!
//! Ids are only unique within one item type in the exports, but must be
//! unique across the whole Solr core, so `id` is replaced by a digest of the
//! item type and the original id.

use std::io::Write;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sha2::{Digest, Sha256};

use crate::reader::{Document, Item};
use crate::{Error, Result};

const IMAGE_LINK: &str = "image_link";
const IMAGE_PLACEHOLDER: &str = "Image";
const MASS_OR_OFFICE: &str = "mass_or_office";

/// Solr id for an item of type `item_type` with export id `id`.
///
/// Stable for the same inputs.
pub fn solr_id(item_type: &str, id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item_type.as_bytes());
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Output path for a converted file: `list_of_chants.xml` becomes
/// `list_of_chants-out.xml`.
pub fn output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".xml").unwrap_or(&name);
    input.with_file_name(format!("{stem}-out.xml"))
}

/// Write `document` as a Solr `<add>` request.
pub fn convert<W: Write>(document: &Document, writer: W) -> Result<W> {
    let mut writer = Writer::new(writer);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new("add")))?;

    for item in &document.items {
        write(&mut writer, Event::Start(BytesStart::new("doc")))?;
        for (name, value) in solr_fields(item) {
            write_field(&mut writer, &name, &value)?;
        }
        write(&mut writer, Event::End(BytesEnd::new("doc")))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("add")))?;

    let mut inner = writer.into_inner();
    inner.flush()?;
    Ok(inner)
}

/// The `(name, value)` fields of one Solr document.
pub fn solr_fields(item: &Item) -> Vec<(String, String)> {
    let mut fields = vec![("type".to_string(), item.tag.clone())];

    for entry in item.row.entries() {
        if entry.value.is_empty() {
            continue;
        }
        if entry.label == IMAGE_LINK && entry.value == IMAGE_PLACEHOLDER {
            continue;
        }

        let name = entry.label.to_lowercase();
        match entry.label.as_str() {
            "id" => fields.push((name, solr_id(&item.tag, &entry.value))),
            MASS_OR_OFFICE if !matches!(entry.value.as_str(), "Mass" | "Office") => {
                fields.push((name.clone(), "Mass".to_string()));
                fields.push((name, "Office".to_string()));
            }
            _ => fields.push((name, entry.value.clone())),
        }
    }

    fields
}

fn write_field<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    let mut start = BytesStart::new("field");
    start.push_attribute(("name", name));
    write(writer, Event::Start(start))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new("field")))
}

fn write<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Xml(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_str;

    #[test]
    fn test_solr_id_is_stable() {
        let a = solr_id("chant", "123");
        assert_eq!(a, solr_id("chant", "123"));
        assert_ne!(a, solr_id("source", "123"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("out/list_of_feasts.xml")),
            PathBuf::from("out/list_of_feasts-out.xml")
        );
        assert_eq!(output_path(Path::new("dump")), PathBuf::from("dump-out.xml"));
    }

    #[test]
    fn test_fields() {
        let doc = parse_str(
            "<genres><genre><id>5</id><name>Antiphon</name><mass_or_office>Mass, Office</mass_or_office>\
             <image_link>Image</image_link><Description></Description></genre></genres>",
        )
        .unwrap();
        let fields = solr_fields(&doc.items[0]);
        assert_eq!(
            fields,
            vec![
                ("type".to_string(), "genre".to_string()),
                ("id".to_string(), solr_id("genre", "5")),
                ("name".to_string(), "Antiphon".to_string()),
                ("mass_or_office".to_string(), "Mass".to_string()),
                ("mass_or_office".to_string(), "Office".to_string()),
            ]
        );
    }

    #[test]
    fn test_convert_document() {
        let doc = parse_str("<feasts><feast><name>A &amp; B</name></feast></feasts>").unwrap();
        let out = String::from_utf8(convert(&doc, Vec::new()).unwrap()).unwrap();
        assert!(out.contains("<add><doc><field name=\"type\">feast</field>"));
        assert!(out.contains("<field name=\"name\">A &amp; B</field>"));
        assert!(out.ends_with("</doc></add>"));
    }
}
