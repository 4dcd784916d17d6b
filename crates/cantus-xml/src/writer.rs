//! Streaming XML writer for export documents.
//!
//! Documents have a fixed two-level shape:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <chants><chant><id>1</id><incipit>Ave</incipit></chant></chants>
//! ```
//!
//! Rows are written one at a time, so an export never holds more than one
//! item in memory regardless of its size.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::name::{is_valid_xml_name, NameTransform};
use crate::row::{Encoding, Row};
use crate::{Error, Result};

/// Shape of an export document.
#[derive(Debug, Clone)]
pub struct XmlOptions {
    /// Root element name.
    pub root_tag: String,
    /// Element name wrapping each row.
    pub item_tag: String,
    /// Rule turning field labels into element names.
    pub name_transform: NameTransform,
    /// Whether to emit the `<?xml …?>` declaration.
    pub declaration: bool,
}

impl XmlOptions {
    /// Options with the given root and item tags, identity names and a
    /// declaration.
    pub fn new(root_tag: impl Into<String>, item_tag: impl Into<String>) -> Self {
        Self {
            root_tag: root_tag.into(),
            item_tag: item_tag.into(),
            name_transform: NameTransform::Identity,
            declaration: true,
        }
    }

    /// Set the element-name transform.
    pub fn with_name_transform(mut self, transform: NameTransform) -> Self {
        self.name_transform = transform;
        self
    }

    /// Omit the XML declaration.
    pub fn without_declaration(mut self) -> Self {
        self.declaration = false;
        self
    }

    /// Check that root and item tags are legal element names.
    pub fn validate(&self) -> Result<()> {
        for tag in [&self.root_tag, &self.item_tag] {
            if !is_valid_xml_name(tag) {
                return Err(Error::InvalidName(tag.clone()));
            }
        }
        Ok(())
    }
}

/// Incremental writer for one export document.
///
/// [`XmlSerializer::new`] writes the declaration and opens the root,
/// [`write_row`](XmlSerializer::write_row) appends items and
/// [`finish`](XmlSerializer::finish) closes the root and hands back the
/// underlying writer.
pub struct XmlSerializer<W: Write> {
    writer: Writer<W>,
    root_tag: String,
    item_tag: String,
    name_transform: NameTransform,
    names: HashMap<String, String>,
    rows: usize,
}

impl<W: Write> XmlSerializer<W> {
    /// Start a document on `writer`.
    pub fn new(writer: W, options: &XmlOptions) -> Result<Self> {
        options.validate()?;

        let mut serializer = Self {
            writer: Writer::new(writer),
            root_tag: options.root_tag.clone(),
            item_tag: options.item_tag.clone(),
            name_transform: options.name_transform.clone(),
            names: HashMap::new(),
            rows: 0,
        };

        if options.declaration {
            serializer.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
            serializer.write(Event::Text(BytesText::from_escaped("\n")))?;
        }
        let root_tag = serializer.root_tag.clone();
        serializer.write(Event::Start(BytesStart::new(root_tag.as_str())))?;

        Ok(serializer)
    }

    /// Append one item.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        let item_tag = self.item_tag.clone();
        self.write(Event::Start(BytesStart::new(item_tag.as_str())))?;

        for entry in row.entries() {
            let name = self.element_name(&entry.label);
            let text: Cow<'_, str> = match entry.encoding {
                Encoding::Raw => Cow::Borrowed(entry.value.as_str()),
                Encoding::Escaped => {
                    let stripped = strip_invalid_chars(&entry.value);
                    Cow::Owned(partial_escape(&*stripped).into_owned())
                }
            };

            self.write(Event::Start(BytesStart::new(name.as_str())))?;
            self.write(Event::Text(BytesText::from_escaped(text)))?;
            self.write(Event::End(BytesEnd::new(name.as_str())))?;
        }

        self.write(Event::End(BytesEnd::new(item_tag.as_str())))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of items written so far.
    #[inline]
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Close the root element and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let root_tag = self.root_tag.clone();
        self.write(Event::End(BytesEnd::new(root_tag.as_str())))?;
        self.write(Event::Text(BytesText::from_escaped("\n")))?;

        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }

    fn element_name(&mut self, label: &str) -> String {
        if let Some(name) = self.names.get(label) {
            return name.clone();
        }
        let name = self.name_transform.apply(label);
        self.names.insert(label.to_string(), name.clone());
        name
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::Xml(e.to_string()))
    }
}

/// Write a complete document containing `rows` to `writer`.
pub fn serialize<'r, W, I>(options: &XmlOptions, rows: I, writer: W) -> Result<W>
where
    W: Write,
    I: IntoIterator<Item = &'r Row>,
{
    let mut serializer = XmlSerializer::new(writer, options)?;
    for row in rows {
        serializer.write_row(row)?;
    }
    serializer.finish()
}

/// Write a complete document to a string.
pub fn to_string<'r, I>(options: &XmlOptions, rows: I) -> Result<String>
where
    I: IntoIterator<Item = &'r Row>,
{
    let bytes = serialize(options, rows, Vec::new())?;
    String::from_utf8(bytes).map_err(|e| Error::Utf8(e.utf8_error()))
}

/// Remove characters that may not appear in XML 1.0 text.
fn strip_invalid_chars(text: &str) -> Cow<'_, str> {
    let is_invalid = |c: char| {
        (c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{FFFE}' || c == '\u{FFFF}'
    };

    if text.chars().any(is_invalid) {
        Cow::Owned(text.chars().filter(|&c| !is_invalid(c)).collect())
    } else {
        Cow::Borrowed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> XmlOptions {
        XmlOptions::new("chants", "chant").without_declaration()
    }

    #[test]
    fn test_empty_document() {
        let xml = to_string(&options(), []).unwrap();
        assert_eq!(xml.trim(), "<chants></chants>");

        let with_decl = to_string(&XmlOptions::new("chants", "chant"), []).unwrap();
        assert!(with_decl.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(with_decl.contains("<chants></chants>"));
    }

    #[test]
    fn test_rows_in_order() {
        let mut row = Row::new();
        row.push("id", "7");
        row.push("incipit", "Ave Maria");
        let xml = to_string(&options(), [&row]).unwrap();
        assert_eq!(
            xml.trim(),
            "<chants><chant><id>7</id><incipit>Ave Maria</incipit></chant></chants>"
        );
    }

    #[test]
    fn test_escaping() {
        let mut row = Row::new();
        row.push("notes", "a < b & c > d");
        row.push_raw("title", "<em>Kyrie</em> &amp;");
        let xml = to_string(&options(), [&row]).unwrap();
        assert!(xml.contains("<notes>a &lt; b &amp; c &gt; d</notes>"));
        assert!(xml.contains("<title><em>Kyrie</em> &amp;</title>"));
    }

    #[test]
    fn test_invalid_chars_dropped() {
        let mut row = Row::new();
        row.push("folio", "12\u{0}r\u{b}");
        let xml = to_string(&options(), [&row]).unwrap();
        assert!(xml.contains("<folio>12r</folio>"));
    }

    #[test]
    fn test_name_transform() {
        let mut row = Row::new();
        row.push("Feast name", "Pascha");
        let opts = options().with_name_transform(NameTransform::Underline);
        let xml = to_string(&opts, [&row]).unwrap();
        assert!(xml.contains("<Feast_name>Pascha</Feast_name>"));
    }

    #[test]
    fn test_invalid_root_rejected() {
        let opts = XmlOptions::new("my chants", "chant");
        assert!(matches!(to_string(&opts, []), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_streaming_opens_root_first() {
        let mut serializer =
            XmlSerializer::new(Vec::new(), &XmlOptions::new("chants", "chant")).unwrap();
        let mut row = Row::new();
        row.push("id", "1");
        serializer.write_row(&row).unwrap();
        let xml = String::from_utf8(serializer.finish().unwrap()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<chants><chant><id>1</id></chant></chants>\n"
        );
    }

    #[test]
    fn test_incremental_count() {
        let mut serializer = XmlSerializer::new(Vec::new(), &options()).unwrap();
        serializer.write_row(&Row::new()).unwrap();
        serializer.write_row(&Row::new()).unwrap();
        assert_eq!(serializer.rows_written(), 2);
        let bytes = serializer.finish().unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert_eq!(xml.trim(), "<chants><chant></chant><chant></chant></chants>");
    }
}
