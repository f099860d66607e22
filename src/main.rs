use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

// command line parsing
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ddicdi::config::GeneratorConfig;
use ddicdi::convert::{ConversionReport, Converter};
use ddicdi::descriptor::{Descriptor, DescriptorSpec, InMemoryRows};
use ddicdi::error::Result;
use ddicdi::graph::NdjsonSink;

#[derive(Parser, Debug)]
#[command(name = "ddicdi")]
#[command(about = "Generate DDI-CDI JSON-LD metadata from a dataset descriptor")]
struct Args {
    /// Descriptor JSON written by a format reader (may embed sample rows)
    descriptor: PathBuf,

    /// Output file; standard output when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Settings file (TOML, JSON or YAML), layered under DDICDI_* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit data points, positions and instance values
    #[arg(long)]
    include_values: bool,

    /// Emit values for every available row instead of the configured cap
    #[arg(long)]
    all_rows: bool,

    /// Write one node per line instead of a JSON-LD document
    #[arg(long)]
    ndjson: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ddicdi=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(report) => {
            info!(
                nodes = report.node_count,
                rows = report.rows_processed,
                fingerprint = %report.fingerprint,
                "wrote graph"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "conversion failed");
            // a partial output is never valid
            if let Some(output) = &args.output {
                let _ = fs::remove_file(output);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ConversionReport> {
    let mut config = GeneratorConfig::load(args.config.as_deref())?;
    if args.include_values {
        config = config.with_values(true);
    }
    if args.all_rows {
        config = config.with_all_rows(true);
    }
    let (descriptor, rows) = read_descriptor(&args.descriptor)?;
    let rows = rows.unwrap_or_else(|| InMemoryRows::empty(descriptor.width()));
    let converter = Converter::new(config)?;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    if args.ndjson {
        let mut sink = NdjsonSink::new(writer);
        let report = converter.convert_into(&descriptor, &rows, &mut sink)?;
        sink.into_inner()?;
        Ok(report)
    } else {
        let (graph, report) = converter.convert(&descriptor, &rows)?.into_parts();
        let mut writer = writer;
        graph.write_document(&mut writer)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(report)
    }
}

fn read_descriptor(path: &Path) -> Result<(Descriptor, Option<InMemoryRows>)> {
    let spec: DescriptorSpec = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Descriptor::from_spec(spec)
}
