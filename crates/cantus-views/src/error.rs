//! Error types for export definitions and queries.

use cantus_common::ErrorKind;
use thiserror::Error;

/// Errors that can occur when declaring exports or building queries.
#[derive(Debug, Error)]
pub enum Error {
    /// No schema has been declared for the entity type.
    #[error("no schema registered for entity type {0:?}")]
    UnknownEntityType(String),

    /// Two fields of one entity type or export share an output label.
    #[error("duplicate output label {label:?} for {scope}")]
    DuplicateLabel { scope: String, label: String },

    /// The source path names a property the schema does not declare.
    #[error("unknown source path {path:?} for entity type {entity_type:?}")]
    UnknownSourcePath { entity_type: String, path: String },

    /// The source path follows a property that is not a reference.
    #[error("{entity_type}.{property} is not a reference")]
    NotAReference { entity_type: String, property: String },

    /// A source path string could not be parsed.
    #[error("invalid source path {0:?}")]
    InvalidSourcePath(String),

    /// An export selects a label no field was registered under.
    #[error("no field labelled {label:?} registered for entity type {entity_type:?}")]
    UnknownField { entity_type: String, label: String },

    /// The export definition is inconsistent.
    #[error("invalid export definition {export:?}: {reason}")]
    InvalidDefinition { export: String, reason: String },

    /// Invalid root or item tag.
    #[error(transparent)]
    Xml(#[from] cantus_xml::Error),

    /// A strict filter received an argument it cannot use.
    #[error("invalid value {value:?} for filter {filter:?}: {reason}")]
    InvalidArgument {
        filter: String,
        value: String,
        reason: String,
    },
}

impl Error {
    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::Validation,
            Self::Xml(e) => e.kind(),
            _ => ErrorKind::Configuration,
        }
    }
}

/// Result type for definition and query operations.
pub type Result<T> = std::result::Result<T, Error>;
