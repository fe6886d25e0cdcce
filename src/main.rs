use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use ocrnorm::{
    batch, CommandEngine, DocumentAggregator, NormalizeOptions, OcrEngine, RawDumpEngine,
};
use serde_json::Value;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Normalize OCR engine output into ordered, validated page JSON.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize a single image.
    Process {
        image: PathBuf,
        /// Directory to write `<image stem>.json` into. Prints to stdout if omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Normalize every image below a directory, mirroring its layout.
    Batch {
        input_root: PathBuf,
        output_root: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// OCR program to run; it gets the image path as its last argument and
    /// must print JSON.
    #[arg(long, conflicts_with = "raw_dir")]
    engine: Option<PathBuf>,
    /// Extra argument for the OCR program, repeatable.
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,
    /// Read raw output captured earlier from `<dir>/<image stem>.json`.
    #[arg(long)]
    raw_dir: Option<PathBuf>,
    /// Raw output is a list of pages; use the first.
    #[arg(long)]
    first_page: bool,
}

#[derive(Args)]
struct OptionArgs {
    /// JSON file with normalization options.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    confidence_threshold: Option<f32>,
    #[arg(long)]
    row_tolerance: Option<u32>,
    /// Confidence for detections that carry no score.
    #[arg(long)]
    default_confidence: Option<f32>,
}

enum CliEngine {
    Command(CommandEngine),
    RawDump(RawDumpEngine),
}

impl OcrEngine for CliEngine {
    fn extract(&self, image_path: &Path) -> ocrnorm::Result<Option<Value>> {
        match self {
            CliEngine::Command(engine) => engine.extract(image_path),
            CliEngine::RawDump(engine) => engine.extract(image_path),
        }
    }
}

impl EngineArgs {
    fn build(self) -> anyhow::Result<CliEngine> {
        match (self.engine, self.raw_dir) {
            (Some(program), None) => Ok(CliEngine::Command(
                CommandEngine::new(program)
                    .args(self.engine_args)
                    .first_page(self.first_page),
            )),
            (None, Some(dir)) => Ok(CliEngine::RawDump(
                RawDumpEngine::new(dir).first_page(self.first_page),
            )),
            _ => bail!("pass either --engine or --raw-dir"),
        }
    }
}

impl OptionArgs {
    fn resolve(self) -> anyhow::Result<NormalizeOptions> {
        let mut options = match &self.config {
            Some(path) => NormalizeOptions::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => NormalizeOptions::default(),
        };
        if let Some(threshold) = self.confidence_threshold {
            options.sequence.confidence_threshold = threshold;
        }
        if let Some(row_tolerance) = self.row_tolerance {
            options.sequence.row_tolerance = row_tolerance;
        }
        if let Some(confidence) = self.default_confidence {
            options.parse.default_confidence = confidence;
        }
        Ok(options)
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Process {
            image,
            out,
            engine,
            options,
        } => {
            let aggregator = DocumentAggregator::builder(engine.build()?)
                .options(options.resolve()?)
                .build();
            let document = aggregator
                .run(&image)
                .with_context(|| format!("Failed to process {}", image.display()))?;
            match out {
                Some(out) => {
                    let path = document.save_json(&out)?;
                    println!("{}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&document)?),
            }
        }
        Command::Batch {
            input_root,
            output_root,
            engine,
            options,
        } => {
            let options = options.resolve()?;
            let aggregator = DocumentAggregator::builder(engine.build()?)
                .options(options)
                .build();
            let report = batch::process_tree(&aggregator, &input_root, &output_root, options)?;
            for failure in &report.failures {
                eprintln!(
                    "failed: {}: {}",
                    failure.image.display(),
                    error_chain(&failure.error)
                );
            }
            println!(
                "Converted {} documents ({} failed)",
                report.processed(),
                report.failures.len()
            );
        }
    }
    Ok(())
}
