//! Reader for two-level export documents.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::row::Row;
use crate::{Error, Result};

/// A parsed export document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Root element name.
    pub root: String,
    /// Items in document order.
    pub items: Vec<Item>,
}

/// One item element and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Item element name.
    pub tag: String,
    /// Child elements as label/value pairs.
    pub row: Row,
}

/// Parse a document from a buffered reader.
///
/// Field text is unescaped. A field carrying a `text` attribute uses the
/// attribute value instead of its content. Markup nested inside a field is
/// flattened to its text.
pub fn read_document<R: BufRead>(input: R) -> Result<Document> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    let mut document = Document::default();
    let mut depth = 0usize;
    let mut item: Option<Item> = None;
    let mut field: Option<(String, String, bool)> = None;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf);
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                return Err(Error::Xml(format!("at byte {}: {}", reader.buffer_position(), e)));
            }
        };

        match event {
            Event::Start(ref e) => {
                match depth {
                    0 => document.root = element_name(e)?,
                    1 => item = Some(new_item(e)?),
                    2 => field = Some(open_field(e)?),
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(ref e) => match depth {
                0 => {
                    document.root = element_name(e)?;
                    return Ok(document);
                }
                1 => document.items.push(new_item(e)?),
                2 => {
                    let (label, value, _) = open_field(e)?;
                    push_field(&mut item, label, value)?;
                }
                _ => {}
            },
            Event::Text(e) => {
                if let Some((_, value, fixed)) = field.as_mut() {
                    if !*fixed {
                        let text = e.unescape().map_err(|e| Error::Xml(e.to_string()))?;
                        value.push_str(&text);
                    }
                }
            }
            Event::CData(e) => {
                if let Some((_, value, fixed)) = field.as_mut() {
                    if !*fixed {
                        value.push_str(std::str::from_utf8(&e)?);
                    }
                }
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::Malformed("unbalanced end tag".into()))?;
                match depth {
                    0 => return Ok(document),
                    1 => {
                        if let Some(done) = item.take() {
                            document.items.push(done);
                        }
                    }
                    2 => {
                        if let Some((label, value, _)) = field.take() {
                            push_field(&mut item, label, value)?;
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => {
                return Err(if document.root.is_empty() {
                    Error::Malformed("no root element".into())
                } else {
                    Error::Malformed("unexpected end of document".into())
                });
            }
            _ => {}
        }
    }
}

/// Parse a document held in memory.
pub fn parse_str(xml: &str) -> Result<Document> {
    read_document(xml.as_bytes())
}

fn element_name(e: &BytesStart<'_>) -> Result<String> {
    Ok(std::str::from_utf8(e.name().as_ref())?.to_string())
}

fn new_item(e: &BytesStart<'_>) -> Result<Item> {
    Ok(Item {
        tag: element_name(e)?,
        row: Row::new(),
    })
}

/// Returns `(label, initial value, value fixed by attribute)`.
fn open_field(e: &BytesStart<'_>) -> Result<(String, String, bool)> {
    let label = element_name(e)?;
    let text_attr = e
        .try_get_attribute("text")
        .map_err(|e| Error::Xml(e.to_string()))?;

    match text_attr {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|e| Error::Xml(e.to_string()))?;
            Ok((label, value.into_owned(), true))
        }
        None => Ok((label, String::new(), false)),
    }
}

fn push_field(item: &mut Option<Item>, label: String, value: String) -> Result<()> {
    match item.as_mut() {
        Some(item) => {
            item.row.push(label, value);
            Ok(())
        }
        None => Err(Error::Malformed(format!("field <{label}> outside of an item"))),
    }
}
