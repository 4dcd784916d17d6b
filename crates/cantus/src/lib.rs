//! Cantus - XML exports of the Cantus database.
//!
//! This crate provides a unified interface to the Cantus exporter crates
//! together with the built-in [`catalog`] of exports.
//!
//! # Crates
//!
//! - [`cantus_common`] - Records, values, error kinds, cancellation
//! - [`cantus_xml`] - XML writing, reading and Solr conversion
//! - [`cantus_views`] - Field registry, export definitions, queries
//! - [`cantus_pipeline`] - Data sources and atomic publishing
//!
//! # Example
//!
//! ```no_run
//! use cantus::prelude::*;
//!
//! let catalog = Catalog::cantus()?;
//! let source = MemorySource::from_json_path("records.json")?;
//! let pipeline = ExportPipeline::new(&source, &source, "out");
//!
//! if let Some(chants) = catalog.get("chants") {
//!     let output = pipeline.run(chants, &ContextArgs::positional(["20230101"]))?;
//!     println!("{} chants -> {}", output.rows, output.path.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;

// Re-export all sub-crates
pub use cantus_common as common;
pub use cantus_pipeline as pipeline;
pub use cantus_views as views;
pub use cantus_xml as xml;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::Catalog;
    pub use cantus_common::{CancellationToken, EntityRef, ErrorKind, Record, Value};
    pub use cantus_pipeline::{
        DataSource, ExportOutput, ExportPipeline, MemorySource, ParallelExporter,
    };
    pub use cantus_views::{
        ContextArgs, ExportDefinition, FieldRegistry, FieldSpec, FilterSpec, SortKey,
    };
    pub use cantus_xml::{read_document, NameTransform, XmlOptions, XmlSerializer};
}

pub use catalog::Catalog;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
