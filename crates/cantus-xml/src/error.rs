//! Error types for XML writing and reading.

use cantus_common::ErrorKind;
use thiserror::Error;

/// Errors that can occur when writing or reading export documents.
#[derive(Debug, Error)]
pub enum Error {
    /// XML writing or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Document does not have the expected root/item/field shape.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// A root or item tag is not a legal XML name.
    #[error("invalid XML element name: {0:?}")]
    InvalidName(String),
}

impl Error {
    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_) => ErrorKind::Configuration,
            _ => ErrorKind::Serialization,
        }
    }
}

/// Result type for XML operations.
pub type Result<T> = std::result::Result<T, Error>;
