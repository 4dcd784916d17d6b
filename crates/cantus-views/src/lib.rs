//! Declarative exports over Cantus records.
//!
//! An export is described once and evaluated per request:
//!
//! - [`FieldRegistry`] - Validated field specs per entity type
//! - [`ExportDefinition`] - Fields, filters, sort, pager and XML shape of
//!   one named export
//! - [`QueryBuilder`] - Resolves filters against [`ContextArgs`] into a
//!   [`QueryRequest`]
//! - [`Projector`] - Turns records into output rows
//!
//! # Example
//!
//! ```
//! use cantus_common::Record;
//! use cantus_views::{
//!     ContextArgs, EntitySchema, ExportDefinition, FieldRegistry, FieldSpec, NoResolver,
//!     Projector,
//! };
//!
//! let mut builder = FieldRegistry::builder();
//! builder.schema(EntitySchema::new("feast").scalars(["tid", "name"]));
//! builder.register("feast", FieldSpec::parse("tid", "id")?)?;
//! builder.register("feast", FieldSpec::property("name").trim())?;
//! let registry = builder.build();
//!
//! let feasts = ExportDefinition::builder("feasts")
//!     .entity_type("feast")
//!     .all_fields()
//!     .build(&registry)?;
//!
//! let record = Record::new("feast", 7).with("tid", 7i64).with("name", " Pascha ");
//! let row = Projector::new(&NoResolver).project(&record, feasts.fields());
//! assert_eq!(row.pairs(), [("id", "7"), ("name", "Pascha")]);
//! assert_eq!(feasts.file_name(&ContextArgs::new()), "feasts.xml");
//! # Ok::<(), cantus_views::Error>(())
//! ```

mod args;
mod definition;
mod error;
mod field;
mod filter;
mod projector;
mod query;
mod registry;
mod schema;

pub use args::ContextArgs;
pub use definition::{sanitize_component, ExportDefinition, ExportDefinitionBuilder, FileNameTemplate};
pub use error::{Error, Result};
pub use field::{strip_tags, FieldSpec, SourcePath, Template, Transform};
pub use filter::{
    parse_full_date, ArgumentBinding, ArgumentFormat, ArgumentSource, FailPolicy, FilterChoice,
    FilterSpec, Operand, Operator,
};
pub use projector::{EntityResolver, NoResolver, Projector};
pub use query::{Condition, Pager, Predicate, QueryBuilder, QueryRequest, SortDirection, SortKey};
pub use registry::{FieldRegistry, FieldRegistryBuilder};
pub use schema::{EntitySchema, PropertyKind};
