//! Parallel export of many definitions using rayon.

use std::sync::atomic::{AtomicUsize, Ordering};

use cantus_views::{ContextArgs, ExportDefinition};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Error;
use crate::pipeline::{ExportOutput, ExportPipeline};

/// Runs several exports at once on the rayon pool.
///
/// Every export is published independently; one failing export does not
/// stop the others.
pub struct ParallelExporter<'p, 'a> {
    pipeline: &'p ExportPipeline<'a>,
}

impl<'p, 'a> ParallelExporter<'p, 'a> {
    pub fn new(pipeline: &'p ExportPipeline<'a>) -> Self {
        Self { pipeline }
    }

    /// Run every definition with the same arguments.
    ///
    /// The progress callback receives (completed, total) counts.
    pub fn export_all<'d, I, F>(
        &self,
        definitions: I,
        args: &ContextArgs,
        mut progress: F,
    ) -> ExportReport
    where
        I: IntoIterator<Item = &'d ExportDefinition>,
        F: FnMut(usize, usize) + Send,
    {
        let definitions: Vec<&ExportDefinition> = definitions.into_iter().collect();
        let total = definitions.len();

        let exported = AtomicUsize::new(0);
        let errors = AtomicUsize::new(0);
        let outputs = Mutex::new(Vec::with_capacity(total));
        let failures = Mutex::new(Vec::new());
        let progress = Mutex::new(&mut progress);

        definitions.par_iter().for_each(|definition| {
            match self.pipeline.run(definition, args) {
                Ok(output) => {
                    exported.fetch_add(1, Ordering::Relaxed);
                    outputs.lock().push(output);
                }
                Err(e) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(export = definition.id(), error = %e, "export failed");
                    failures.lock().push((definition.id().to_string(), e));
                }
            }

            let done = exported.load(Ordering::Relaxed) + errors.load(Ordering::Relaxed);
            (*progress.lock())(done, total);
        });

        let mut outputs = outputs.into_inner();
        outputs.sort_by(|a, b| a.export.cmp(&b.export));
        let mut failures = failures.into_inner();
        failures.sort_by(|a, b| a.0.cmp(&b.0));

        ExportReport {
            stats: ExportStats {
                exported: exported.load(Ordering::Relaxed),
                errors: errors.load(Ordering::Relaxed),
                total,
            },
            outputs,
            failures,
        }
    }
}

/// Statistics from a parallel export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    /// Number of exports published.
    pub exported: usize,
    /// Number of exports that failed.
    pub errors: usize,
    /// Total number of exports attempted.
    pub total: usize,
}

impl ExportStats {
    /// Check if all exports were published.
    pub fn is_complete(&self) -> bool {
        self.errors == 0 && self.exported == self.total
    }
}

/// Outcome of [`ParallelExporter::export_all`], sorted by export id.
#[derive(Debug)]
pub struct ExportReport {
    pub stats: ExportStats,
    pub outputs: Vec<ExportOutput>,
    pub failures: Vec<(String, Error)>,
}
