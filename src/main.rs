//! Cantus CLI - Command-line tool exporting Cantus records to XML.
//!
//! This is the main entry point for the `cantus` command-line application.

mod config;

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use cantus::prelude::*;
use cantus::xml::{cantusids, solr, Document};
use tempfile::NamedTempFile;

use crate::config::Config;

/// Cantus - export Cantus database records to XML
#[derive(Parser)]
#[command(name = "cantus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./cantus.toml when present)
    #[arg(short, long, global = true, env = "CANTUS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// JSON record file
    #[arg(short, long, env = "CANTUS_DATA")]
    data: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in exports
    List,

    /// Show fields, filters and tags of an export
    Show {
        /// Export id
        export: String,
    },

    /// Run one export
    Run {
        /// Export id
        export: String,

        /// Positional arguments, e.g. a YYYYMMDD day
        args: Vec<String>,

        /// Text for the export's `combine` search
        #[arg(long)]
        search: Option<String>,

        /// Exposed input as NAME=VALUE
        #[arg(long = "set", value_parser = parse_named)]
        named: Vec<(String, String)>,

        #[command(flatten)]
        io: DataArgs,

        /// Write the document to stdout instead of publishing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Run every export in parallel
    All {
        /// Only exports whose id matches this glob
        #[arg(short, long)]
        filter: Option<String>,

        /// Positional arguments passed to every export
        args: Vec<String>,

        #[command(flatten)]
        io: DataArgs,
    },

    /// Convert an exported document into a Solr update request
    ToSolr {
        /// Exported XML file
        input: PathBuf,

        /// Output file (defaults to <input>-out.xml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Group an exported chants document by Cantus ID
    ToCantusids {
        /// Exported chants file
        input: PathBuf,

        /// Output file (defaults to list_of_cantusids.xml next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    initialize_logging(&config, cli.verbose);

    let catalog = Catalog::cantus().context("Failed to build the export catalog")?;

    match cli.command {
        Commands::List => cmd_list(&catalog),
        Commands::Show { export } => cmd_show(&catalog, &export)?,
        Commands::Run {
            export,
            args,
            search,
            named,
            io,
            stdout,
        } => {
            let mut args = ContextArgs::positional(args);
            if let Some(text) = search {
                args = args.with_named("combine", text);
            }
            for (name, value) in named {
                args = args.with_named(name, value);
            }
            cmd_run(&catalog, &config, &export, &args, &io, stdout)?;
        }
        Commands::All { filter, args, io } => {
            cmd_all(&catalog, &config, filter.as_deref(), &ContextArgs::positional(args), &io)?;
        }
        Commands::ToSolr { input, output } => cmd_to_solr(&input, output)?,
        Commands::ToCantusids { input, output } => cmd_to_cantusids(&input, output)?,
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level; `-v` raises the latter.
fn initialize_logging(config: &Config, verbose: u8) {
    let level = config.logging.level.raised(verbose);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    if config.logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}

fn parse_named(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
    if name.is_empty() {
        return Err(format!("empty input name in {s:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn find<'c>(catalog: &'c Catalog, id: &str) -> Result<&'c ExportDefinition> {
    match catalog.get(id) {
        Some(definition) => Ok(&**definition),
        None => bail!(
            "Unknown export {id:?} (available: {})",
            catalog.ids().collect::<Vec<_>>().join(", ")
        ),
    }
}

fn load_source(config: &Config, io: &DataArgs) -> Result<MemorySource> {
    let path = io
        .data
        .as_ref()
        .or(config.data.path.as_ref())
        .context("No record file: pass --data or set [data] path in cantus.toml")?;

    let start = Instant::now();
    let source = MemorySource::from_json_path(path)
        .with_context(|| format!("Failed to load records from {}", path.display()))?;
    tracing::info!(records = source.len(), elapsed = ?start.elapsed(), "loaded records");
    Ok(source)
}

fn output_dir<'a>(config: &'a Config, io: &'a DataArgs) -> &'a Path {
    io.output.as_deref().unwrap_or(&config.output.directory)
}

fn cmd_list(catalog: &Catalog) {
    for definition in catalog.exports() {
        println!(
            "{:<12} {:<11} {}",
            definition.id(),
            definition.entity_type(),
            definition.file_name_template().as_str()
        );
    }
}

fn cmd_show(catalog: &Catalog, id: &str) -> Result<()> {
    let definition = find(catalog, id)?;
    let options = definition.xml_options();

    println!("Export:      {}", definition.id());
    if let Some(description) = definition.description() {
        println!("Description: {description}");
    }
    println!("Entity type: {}", definition.entity_type());
    println!("File name:   {}", definition.file_name_template().as_str());
    println!("Elements:    <{}><{}>...", options.root_tag, options.item_tag);

    println!("\nFields:");
    for field in definition.fields() {
        let hidden = if field.hides_empty() { " (hidden when empty)" } else { "" };
        println!("  {:<32} <- {}{hidden}", field.label(), field.source());
    }

    if !definition.filters().is_empty() {
        println!("\nFilters:");
        for filter in definition.filters() {
            let input = match filter.binding() {
                Some(binding) => format!(" [{:?}]", binding.source),
                None => String::new(),
            };
            if filter.choices().is_empty() {
                println!(
                    "  {:<24} {:?} {}{input}",
                    filter.id(),
                    filter.operator(),
                    filter.fields().join(", ")
                );
            } else {
                println!("  {:<24} choice of {}{input}", filter.id(), filter.fields().join(", "));
                for choice in filter.choices() {
                    println!("    {:>3}: {:?} {:?}", choice.id, choice.operator, choice.operand);
                }
            }
        }
    }

    if !definition.sort().is_empty() {
        println!("\nSort:");
        for key in definition.sort() {
            println!("  {} {:?}", key.field, key.direction);
        }
    }

    Ok(())
}

fn cmd_run(
    catalog: &Catalog,
    config: &Config,
    id: &str,
    args: &ContextArgs,
    io: &DataArgs,
    stdout: bool,
) -> Result<()> {
    let definition = find(catalog, id)?;
    let source = load_source(config, io)?;
    let pipeline = ExportPipeline::new(&source, &source, output_dir(config, io));

    if stdout {
        let out = BufWriter::new(io::stdout().lock());
        pipeline
            .write_to(definition, args, out)
            .with_context(|| format!("Export {id} failed"))?;
        return Ok(());
    }

    let start = Instant::now();
    let output = pipeline
        .run(definition, args)
        .with_context(|| format!("Export {id} failed"))?;
    println!(
        "Exported {} rows to {} in {:?}",
        output.rows,
        output.path.display(),
        start.elapsed()
    );

    Ok(())
}

fn cmd_all(
    catalog: &Catalog,
    config: &Config,
    filter: Option<&str>,
    args: &ContextArgs,
    io: &DataArgs,
) -> Result<()> {
    let pattern = filter
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --filter pattern")?;
    let definitions: Vec<&ExportDefinition> = catalog
        .exports()
        .iter()
        .filter(|d| pattern.as_ref().map_or(true, |p| p.matches(d.id())))
        .map(|d| &**d)
        .collect();

    if definitions.is_empty() {
        bail!("No export matches {:?}", filter.unwrap_or("*"));
    }

    let source = load_source(config, io)?;
    let pipeline = ExportPipeline::new(&source, &source, output_dir(config, io));

    let pb = ProgressBar::new(definitions.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = ParallelExporter::new(&pipeline).export_all(definitions, args, |done, _| {
        pb.set_position(done as u64);
    });
    pb.finish_with_message("Done");

    for output in &report.outputs {
        println!("{:<12} {:>8} rows  {}", output.export, output.rows, output.path.display());
    }
    for (export, error) in &report.failures {
        eprintln!("Error exporting {export}: {error}");
    }
    println!(
        "Exported {} of {} exports in {:?} ({} errors)",
        report.stats.exported,
        report.stats.total,
        start.elapsed(),
        report.stats.errors
    );

    if !report.stats.is_complete() {
        bail!("{} export(s) failed", report.stats.errors);
    }
    Ok(())
}

fn cmd_to_solr(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| solr::output_path(input));
    println!("Converting: {} -> {}", input.display(), output.display());

    let document = read_input(input)?;
    publish(&output, |writer| solr::convert(&document, writer))
        .context("Failed to write Solr document")?;

    println!("Converted {} items", document.items.len());

    Ok(())
}

fn cmd_to_cantusids(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| input.with_file_name(cantusids::OUTPUT_FILE));
    println!("Grouping: {} -> {}", input.display(), output.display());

    let document = read_input(input)?;
    let mut groups = 0;
    publish(&output, |writer| {
        let (writer, count) = cantusids::convert(&document, writer)?;
        groups = count;
        Ok(writer)
    })
    .context("Failed to write Cantus ID document")?;

    println!("Grouped {} chants into {groups} Cantus IDs", document.items.len());

    Ok(())
}

fn read_input(input: &Path) -> Result<Document> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    read_document(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", input.display()))
}

/// Write through a temporary file in the output directory, then rename it
/// into place.
fn publish<F>(output: &Path, write: F) -> Result<()>
where
    F: FnOnce(BufWriter<NamedTempFile>) -> cantus::xml::Result<BufWriter<NamedTempFile>>,
{
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".cantus-")
        .suffix(".xml.tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;

    let writer = write(BufWriter::new(temp))?;
    let temp = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush")?;
    temp.as_file().sync_all()?;
    temp.persist(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "cantus",
            "-vv",
            "run",
            "feasts",
            "--search",
            "pasch",
            "--set",
            "field_feastmonth_value=4",
            "--stdout",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                export,
                search,
                named,
                stdout,
                ..
            } => {
                assert_eq!(export, "feasts");
                assert_eq!(search.as_deref(), Some("pasch"));
                assert_eq!(named, [("field_feastmonth_value".to_string(), "4".to_string())]);
                assert!(stdout);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(
            parse_named("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_named("novalue").is_err());
        assert!(parse_named("=x").is_err());
    }

    #[test]
    fn test_to_solr() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("list_of_genres.xml");
        std::fs::write(
            &input,
            "<genres><genre><name>Antiphon</name><mass_or_office>Office</mass_or_office>\
             <id>7</id></genre></genres>",
        )
        .unwrap();

        cmd_to_solr(&input, None).unwrap();

        let out = std::fs::read_to_string(dir.path().join("list_of_genres-out.xml")).unwrap();
        assert!(out.contains("<add>"));
        assert!(out.contains(&solr::solr_id("genre", "7")));
        assert!(out.contains(">Antiphon<"));
    }

    #[test]
    fn test_to_cantusids() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("list_of_chants-all.xml");
        std::fs::write(
            &input,
            "<chants><chant><id>1</id><cantus_id>001</cantus_id><incipit>Ave</incipit></chant>\
             <chant><id>2</id><cantus_id>001</cantus_id></chant></chants>",
        )
        .unwrap();

        cmd_to_cantusids(&input, None).unwrap();

        let out = std::fs::read_to_string(dir.path().join("list_of_cantusids.xml")).unwrap();
        assert!(out.contains(
            "<cantusid><id text=\"001\"/><incipit text=\"Ave\"/>\
             <member_id text=\"1\"/><member_id text=\"2\"/></cantusid>"
        ));
    }

    #[test]
    fn test_to_cantusids_rejects_other_documents() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("list_of_feasts.xml");
        std::fs::write(&input, "<feasts><feast><id>1</id></feast></feasts>").unwrap();

        assert!(cmd_to_cantusids(&input, None).is_err());
        assert!(!dir.path().join("list_of_cantusids.xml").exists());
    }
}
