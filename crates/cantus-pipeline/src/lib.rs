//! Export pipeline for Cantus records.
//!
//! - [`ExportPipeline`] - Runs one export and publishes it atomically
//! - [`ParallelExporter`] - Runs many exports on the rayon pool
//! - [`DataSource`] / [`MemorySource`] - Where records come from

mod error;
mod parallel;
mod pipeline;
mod source;

pub use error::{Error, Result, SourceError};
pub use parallel::{ExportReport, ExportStats, ParallelExporter};
pub use pipeline::{ExportOutput, ExportPipeline, ExportState};
pub use source::{DataSource, MemorySource, RecordStream};
