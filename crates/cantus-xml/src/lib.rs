//! XML documents for Cantus exports.
//!
//! This crate writes and reads the flat `<root><item><field/></item></root>`
//! documents produced by the exporter:
//!
//! - [`XmlSerializer`] - Streaming writer, one [`Row`] at a time
//! - [`NameTransform`] - Label to element-name rules
//! - [`read_document`] - Parser turning a document back into rows
//! - [`solr`] - Conversion into Solr `<add>` update requests
//! - [`cantusids`] - Chant exports grouped by Cantus ID
//!
//! # Example
//!
//! ```
//! use cantus_xml::{to_string, Row, XmlOptions};
//!
//! let mut row = Row::new();
//! row.push("id", "1");
//! row.push("incipit", "Ave maris stella");
//!
//! let xml = to_string(&XmlOptions::new("chants", "chant"), [&row])?;
//! assert!(xml.contains("<chant><id>1</id><incipit>Ave maris stella</incipit></chant>"));
//! # Ok::<(), cantus_xml::Error>(())
//! ```

pub mod cantusids;
mod error;
mod name;
mod reader;
mod row;
mod writer;

#[cfg(feature = "solr")]
pub mod solr;

pub use error::{Error, Result};
pub use name::{encode_xml_name, is_valid_xml_name, NameTransform};
pub use reader::{parse_str, read_document, Document, Item};
pub use row::{Encoding, Entry, Row};
pub use writer::{serialize, to_string, XmlOptions, XmlSerializer};
