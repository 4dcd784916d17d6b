//! Single export runs: fetch, project, serialize and publish.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cantus_common::CancellationToken;
use cantus_views::{ContextArgs, EntityResolver, ExportDefinition, Projector, QueryRequest};
use cantus_xml::XmlSerializer;

use crate::error::{Error, Result};
use crate::source::DataSource;

/// Stage of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Fetching,
    Projecting,
    Serializing,
    Published,
    Failed,
}

impl ExportState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Projecting => "projecting",
            Self::Serializing => "serializing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Transitions<'a> {
    export: &'a str,
    state: ExportState,
}

impl<'a> Transitions<'a> {
    fn new(export: &'a str) -> Self {
        Self {
            export,
            state: ExportState::Idle,
        }
    }

    fn enter(&mut self, next: ExportState) {
        tracing::debug!(export = self.export, from = %self.state, to = %next, "export state");
        self.state = next;
    }
}

/// Result of a published export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutput {
    /// Export id.
    pub export: String,
    /// Final path of the published file.
    pub path: PathBuf,
    /// Number of items written.
    pub rows: usize,
}

/// Runs export definitions against a data source.
///
/// Documents are written to a temporary file in the output directory and
/// renamed into place once complete, so readers never see a partial file
/// and concurrent runs for one name leave exactly one complete document.
///
/// # Example
///
/// ```no_run
/// use cantus_pipeline::{ExportPipeline, MemorySource};
/// # fn demo(definition: &cantus_views::ExportDefinition) -> cantus_pipeline::Result<()> {
/// let source = MemorySource::from_json_path("records.json")?;
/// let pipeline = ExportPipeline::new(&source, &source, "out");
///
/// let output = pipeline.run(definition, &cantus_views::ContextArgs::new())?;
/// println!("{} rows -> {}", output.rows, output.path.display());
/// # Ok(())
/// # }
/// ```
pub struct ExportPipeline<'a> {
    source: &'a dyn DataSource,
    resolver: &'a dyn EntityResolver,
    output_dir: PathBuf,
    cancel: CancellationToken,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(
        source: &'a dyn DataSource,
        resolver: &'a dyn EntityResolver,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            resolver,
            output_dir: output_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token`; a cancelled run fails with [`Error::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `definition` and publish the document under its templated name.
    ///
    /// On failure nothing is left at the final path and the temporary file
    /// is removed.
    pub fn run(&self, definition: &ExportDefinition, args: &ContextArgs) -> Result<ExportOutput> {
        let mut transitions = Transitions::new(definition.id());
        let result = self.publish(definition, args, &mut transitions);
        if let Err(e) = &result {
            transitions.enter(ExportState::Failed);
            tracing::debug!(export = definition.id(), error = %e, "export failed");
        }
        result
    }

    /// Stream the document for `definition` into `writer` without
    /// publishing a file. Returns the number of items written.
    pub fn write_to<W: Write>(
        &self,
        definition: &ExportDefinition,
        args: &ContextArgs,
        writer: W,
    ) -> Result<usize> {
        let mut transitions = Transitions::new(definition.id());
        let request = definition.query(args)?;
        let result = self
            .stream(definition, &request, writer, &mut transitions)
            .and_then(|(mut writer, rows)| {
                writer
                    .flush()
                    .map_err(Error::io("<writer>"))
                    .map(|()| rows)
            });
        match &result {
            Ok(_) => transitions.enter(ExportState::Published),
            Err(_) => transitions.enter(ExportState::Failed),
        }
        result
    }

    fn publish(
        &self,
        definition: &ExportDefinition,
        args: &ContextArgs,
        transitions: &mut Transitions<'_>,
    ) -> Result<ExportOutput> {
        let request = definition.query(args)?;
        let path = self.output_dir.join(definition.file_name(args));

        fs::create_dir_all(&self.output_dir).map_err(Error::io(&self.output_dir))?;
        let temp = tempfile::Builder::new()
            .prefix(".cantus-")
            .suffix(".xml.tmp")
            .tempfile_in(&self.output_dir)
            .map_err(Error::io(&self.output_dir))?;

        let (writer, rows) =
            self.stream(definition, &request, BufWriter::new(temp), transitions)?;
        let temp = writer
            .into_inner()
            .map_err(|e| Error::io(&path)(e.into_error()))?;
        temp.as_file().sync_all().map_err(Error::io(temp.path()))?;

        // dropping a failed persist removes the temporary file
        temp.persist(&path)
            .map_err(|e| Error::io(&path)(e.error))?;
        transitions.enter(ExportState::Published);
        tracing::info!(export = definition.id(), rows, path = %path.display(), "published export");

        Ok(ExportOutput {
            export: definition.id().to_string(),
            path,
            rows,
        })
    }

    fn stream<W: Write>(
        &self,
        definition: &ExportDefinition,
        request: &QueryRequest,
        writer: W,
        transitions: &mut Transitions<'_>,
    ) -> Result<(W, usize)> {
        self.check_cancelled(definition)?;

        transitions.enter(ExportState::Fetching);
        let records = self.source.fetch(request)?;

        transitions.enter(ExportState::Projecting);
        let projector = Projector::new(self.resolver);
        let mut serializer = XmlSerializer::new(writer, definition.xml_options())?;
        for record in records {
            self.check_cancelled(definition)?;
            let record = record?;
            let row = projector.project(&record, definition.fields());
            serializer.write_row(&row)?;
        }

        transitions.enter(ExportState::Serializing);
        let rows = serializer.rows_written();
        let writer = serializer.finish()?;
        Ok((writer, rows))
    }

    fn check_cancelled(&self, definition: &ExportDefinition) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(definition.id().to_string()));
        }
        Ok(())
    }
}
