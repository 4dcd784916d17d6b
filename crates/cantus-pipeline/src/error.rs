//! Error types for export runs.

use std::io;
use std::path::PathBuf;

use cantus_common::ErrorKind;
use thiserror::Error;

/// Failure reported by a data source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the backing store failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing store holds data that is not a valid record.
    #[error("invalid record data: {0}")]
    Parse(String),

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Errors that can occur during an export run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] cantus_views::Error),

    #[error("data source failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Xml(#[from] cantus_xml::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("export {0:?} cancelled")]
    Cancelled(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Definition(e) => e.kind(),
            Self::Source(_) => ErrorKind::DataSource,
            Self::Xml(e) => e.kind(),
            Self::Io { .. } => ErrorKind::Serialization,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// Result type for export runs.
pub type Result<T> = std::result::Result<T, Error>;
