//! Common types for the Cantus exporter.
//!
//! This crate provides the types shared by every other Cantus crate:
//!
//! - [`Record`] - An entity instance fetched from a data source
//! - [`Value`] / [`EntityRef`] - Attribute values, including references
//! - [`ErrorKind`] - The error taxonomy all crate errors map onto
//! - [`CancellationToken`] - Cooperative cancellation for running exports

mod cancel;
mod error;
mod record;
mod value;

pub use cancel::CancellationToken;
pub use error::ErrorKind;
pub use record::Record;
pub use value::{EntityRef, Value};
