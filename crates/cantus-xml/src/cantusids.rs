//! Grouping of chant exports by Cantus ID.
//!
//! Reads a `<chants><chant/></chants>` document and writes one `<cantusid>`
//! per distinct `cantus_id`. Values are held in `text` attributes:
//!
//! ```xml
//! <cantusids>
//!   <cantusid><id text="001001"/><incipit text="Ave"/><member_id text="2"/></cantusid>
//! </cantusids>
//! ```

use std::collections::HashMap;
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::reader::{Document, Item};
use crate::{Error, Result};

/// Default name of the converted file.
pub const OUTPUT_FILE: &str = "list_of_cantusids.xml";

const CHANTS: &str = "chants";
const CHANT: &str = "chant";

/// Chants sharing one Cantus ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CantusId {
    pub id: String,
    pub incipit: String,
    pub genre_id: String,
    pub full_text: String,
    /// Chant ids in document order.
    pub member_ids: Vec<String>,
}

impl CantusId {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Fill still-empty fields from `chant` and record it as a member.
    fn absorb(&mut self, chant: &Item, chant_id: &str) {
        let fill = |slot: &mut String, label: &str| {
            if slot.is_empty() {
                if let Some(value) = chant.row.get(label) {
                    *slot = value.to_string();
                }
            }
        };
        fill(&mut self.incipit, "incipit");
        fill(&mut self.genre_id, "genre_id");
        fill(&mut self.full_text, "full_text");
        self.member_ids.push(chant_id.to_string());
    }
}

/// Group the chants of `document` by Cantus ID, in order of first
/// appearance.
///
/// Chants without a Cantus ID are skipped. For incipit, genre and full text
/// the first non-empty value wins.
pub fn group(document: &Document) -> Result<Vec<CantusId>> {
    if document.root != CHANTS {
        return Err(Error::Malformed(format!(
            "expected a <{CHANTS}> document, found <{}>",
            document.root
        )));
    }

    let mut groups: Vec<CantusId> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for chant in document.items.iter().filter(|item| item.tag == CHANT) {
        let Some(cantus_id) = chant.row.get("cantus_id").filter(|v| !v.is_empty()) else {
            continue;
        };
        let Some(chant_id) = chant.row.get("id") else {
            return Err(Error::Malformed(format!(
                "chant with Cantus ID {cantus_id:?} has no id"
            )));
        };

        let slot = *index.entry(cantus_id.to_string()).or_insert_with(|| {
            groups.push(CantusId::new(cantus_id));
            groups.len() - 1
        });
        groups[slot].absorb(chant, chant_id);
    }

    Ok(groups)
}

/// Write `groups` as a `<cantusids>` document. Empty fields are omitted.
pub fn write_groups<W: Write>(groups: &[CantusId], writer: W) -> Result<W> {
    let mut writer = Writer::new(writer);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new("cantusids")))?;

    for group in groups {
        write(&mut writer, Event::Start(BytesStart::new("cantusid")))?;
        write_value(&mut writer, "id", &group.id)?;
        for (name, value) in [
            ("incipit", &group.incipit),
            ("genre_id", &group.genre_id),
            ("full_text", &group.full_text),
        ] {
            if !value.is_empty() {
                write_value(&mut writer, name, value)?;
            }
        }
        for member in &group.member_ids {
            write_value(&mut writer, "member_id", member)?;
        }
        write(&mut writer, Event::End(BytesEnd::new("cantusid")))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("cantusids")))?;

    let mut inner = writer.into_inner();
    inner.flush()?;
    Ok(inner)
}

/// Group a chants document and write the result.
///
/// Returns the writer and the number of Cantus IDs written.
pub fn convert<W: Write>(document: &Document, writer: W) -> Result<(W, usize)> {
    let groups = group(document)?;
    let writer = write_groups(&groups, writer)?;
    Ok((writer, groups.len()))
}

fn write_value<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("text", value));
    write(writer, Event::Empty(element))
}

fn write<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Xml(e.to_string()))
}
