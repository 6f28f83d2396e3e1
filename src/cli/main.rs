//! Background Removal CLI Tool
//!
//! Command-line interface for the offline segmentation pipeline.

use super::config::CliConfigBuilder;
use crate::{
    attempts::{LocalPipelineAttempt, RemovalAttempt},
    config::{OutputFormat, PipelineOptions},
    remove_background_with_timeout,
    services::{ImageIOService, OutputFormatHandler},
    tracing_config::init_cli_tracing,
    types::{PipelineResult, RasterBuffer},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Offline background removal tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "offline-bgremove")]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Subject profile [default: general]
    #[arg(short, long, value_enum)]
    pub model: Option<CliModel>,

    /// Speed/quality trade-off [default: balanced]
    #[arg(short, long, value_enum)]
    pub precision: Option<CliPrecision>,

    /// Boundary smoothing passes, 0-5 [default: 2]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub edge_smoothing: Option<u8>,

    /// Output format [default: png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Seed for reproducible results
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON options file; command-line flags take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of images processed concurrently
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Process directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for batch processing (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Cancel an image that takes longer than this many milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Print processing metadata as JSON
    #[arg(long)]
    pub metadata: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliModel {
    Person,
    Product,
    Animal,
    Car,
    Building,
    General,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliPrecision {
    Fast,
    Balanced,
    Precise,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Webp,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let options = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Starting background removal CLI");
    info!("Input(s): {}", cli.input.join(", "));
    info!(
        "Model: {}, precision: {}, edge smoothing: {}, format: {}",
        options.model, options.precision, options.edge_smoothing, options.output_format
    );

    if !OutputFormatHandler::is_available(options.output_format) {
        anyhow::bail!(
            "Output format {} is not available in this build",
            options.output_format
        );
    }

    let start = Instant::now();
    let processed = process_inputs(&cli, &options).await?;
    info!(
        "Processed {} image(s) in {:.2}s",
        processed,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

async fn process_inputs(cli: &Cli, options: &PipelineOptions) -> Result<usize> {
    if cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli, options).await;
    }

    let mut all_files = Vec::new();
    for input in &cli.input {
        let path = PathBuf::from(input);
        if path.is_file() {
            if ImageIOService::is_supported_format(&path) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }

    all_files.sort();
    all_files.dedup();
    let file_count = all_files.len();
    info!("Found {} image file(s) to process", file_count);

    let output_dir = prepare_output_dir(cli, file_count)?;
    let jobs = cli.jobs.min(file_count);

    let progress = if file_count > 1 {
        let pb = ProgressBar::new(file_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let outcomes: Vec<(PathBuf, Result<PathBuf>)> = stream::iter(all_files.into_iter().map(|input| {
        let output = match (&output_dir, file_count) {
            (_, 1) => cli.output.as_ref().map(PathBuf::from),
            (Some(dir), _) => Some(output_path_in_dir(&input, dir, options.output_format)),
            (None, _) => None,
        }
        .unwrap_or_else(|| default_output_path(&input, options.output_format));
        let progress = progress.clone();
        async move {
            if let Some(ref pb) = progress {
                pb.set_message(format!("{}", input.display()));
            }
            let outcome = process_single_file(cli, options, &input, &output).await;
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
            (input, outcome.map(|()| output))
        }
    }))
    .buffer_unordered(jobs)
    .collect()
    .await;

    let mut processed_count = 0usize;
    let mut failed_count = 0usize;
    for (input, outcome) in &outcomes {
        match outcome {
            Ok(output) => {
                processed_count += 1;
                log::debug!("Wrote {} -> {}", input.display(), output.display());
            },
            Err(e) => {
                failed_count += 1;
                error!("Failed to process {}: {:#}", input.display(), e);
            },
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {processed_count}, Failed: {failed_count}"
        ));
    }

    if failed_count > 0 {
        if processed_count == 0 {
            anyhow::bail!("All {} image(s) failed to process", failed_count);
        }
        warn!("Some files failed to process. Processed: {processed_count}, Failed: {failed_count}");
    }

    Ok(processed_count)
}

fn prepare_output_dir(cli: &Cli, file_count: usize) -> Result<Option<PathBuf>> {
    if file_count <= 1 {
        return Ok(None);
    }
    let Some(ref output) = cli.output else {
        return Ok(None);
    };
    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }

    let output_path = PathBuf::from(output);
    if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    std::fs::create_dir_all(&output_path).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;
    Ok(Some(output_path))
}

async fn run_pipeline(
    buffer: &RasterBuffer,
    options: &PipelineOptions,
    timeout: Option<Duration>,
) -> crate::Result<PipelineResult> {
    match timeout {
        Some(limit) => remove_background_with_timeout(buffer, options, limit).await,
        None => LocalPipelineAttempt::new().attempt(buffer, options).await,
    }
}

async fn process_single_file(
    cli: &Cli,
    options: &PipelineOptions,
    input_path: &Path,
    output_path: &Path,
) -> Result<()> {
    let buffer = ImageIOService::load_buffer(input_path)
        .with_context(|| format!("Failed to load {}", input_path.display()))?;

    let result = run_pipeline(&buffer, options, CliConfigBuilder::timeout(cli))
        .await
        .context("Failed to remove background")?;

    if output_path == Path::new("-") {
        write_stdout(&result.to_bytes(options.output_format)?)?;
    } else {
        result
            .save(output_path, options.output_format)
            .context("Failed to save result")?;
    }

    report_result(cli, input_path, output_path == Path::new("-"), &result)
}

async fn process_stdin(cli: &Cli, options: &PipelineOptions) -> Result<usize> {
    info!("Reading image from stdin");
    let image_data = read_stdin()?;
    let image = ImageIOService::load_from_bytes(&image_data)
        .context("Failed to decode image data from stdin")?;
    let buffer = RasterBuffer::from_dynamic_image(&image)?;

    let result = run_pipeline(&buffer, options, CliConfigBuilder::timeout(cli))
        .await
        .context("Failed to remove background")?;

    let to_stdout = match cli.output.as_deref() {
        None | Some("-") => {
            write_stdout(&result.to_bytes(options.output_format)?)?;
            true
        },
        Some(target) => {
            result
                .save(target, options.output_format)
                .context("Failed to save result")?;
            false
        },
    };

    report_result(cli, Path::new("<stdin>"), to_stdout, &result)?;
    Ok(1)
}

fn report_result(
    cli: &Cli,
    input_path: &Path,
    image_on_stdout: bool,
    result: &PipelineResult,
) -> Result<()> {
    let metadata = &result.metadata;
    info!(
        "{}: {} path, confidence {:.2}, edge quality {:.2}, {}ms",
        input_path.display(),
        metadata.path,
        metadata.confidence,
        metadata.edge_quality,
        metadata.processing_time_ms
    );
    if let Some(ref reason) = metadata.fallback_reason {
        info!("  fallback reason: {}", reason);
    }
    log::debug!("  {}", result.timing_summary());

    if cli.metadata {
        let json = metadata.to_json()?;
        if image_on_stdout {
            eprintln!("{}", json);
        } else {
            println!("{}", json);
        }
    }
    Ok(())
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if ImageIOService::is_supported_format(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if ImageIOService::is_supported_format(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat).is_ok_and(|p| p.matches(filename))
            }),
        None => true,
    }
}

fn output_file_name(input_path: &Path, format: OutputFormat) -> String {
    let stem = input_path.file_stem().unwrap_or_default();
    format!(
        "{}_bg_removed.{}",
        stem.to_string_lossy(),
        OutputFormatHandler::get_extension(format)
    )
}

/// `<stem>_bg_removed.<ext>` next to the input
fn default_output_path(input_path: &Path, format: OutputFormat) -> PathBuf {
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(output_file_name(input_path, format))
}

fn output_path_in_dir(input_path: &Path, output_dir: &Path, format: OutputFormat) -> PathBuf {
    output_dir.join(output_file_name(input_path, format))
}
