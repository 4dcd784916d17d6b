//! Error taxonomy shared by every Cantus crate.

use std::fmt;

/// Broad category of an export failure.
///
/// Each crate has its own error enum; all of them map onto one of these
/// kinds through a `kind()` method so callers can decide how to react
/// without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid static configuration (duplicate labels, unknown source paths).
    /// Fatal at startup.
    Configuration,
    /// A caller-supplied argument was malformed and its filter is strict.
    Validation,
    /// The upstream record fetch failed.
    DataSource,
    /// Writing the document failed (XML, I/O, publish).
    Serialization,
    /// The run was cancelled by the caller.
    Cancelled,
}

impl ErrorKind {
    /// Whether the error comes from static configuration and should stop the
    /// process rather than a single run.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Configuration)
    }

    /// Short lowercase name, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::DataSource => "data-source",
            Self::Serialization => "serialization",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
