#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Offline Background Removal
//!
//! A network-free foreground/background segmentation pipeline built from
//! classical image-processing stages: L\*a\*b\* conversion, multi-scale Sobel
//! edges, border background sampling, seeded K-means, foreground cluster
//! classification, energy-based mask refinement, morphological cleanup and
//! boundary smoothing. When the clustering path hits a degenerate case the
//! whole image is re-segmented with a plain RGB colour-distance threshold.
//!
//! ## Features
//!
//! - **No model files, no network**: everything runs on the CPU from pixel data
//! - **Reproducible**: pass a seed to make sampling and K-means deterministic
//! - **Cancellable**: cooperative cancellation and progress at stage boundaries
//! - **Async friendly**: async entry points run the pipeline on blocking workers
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offline_bgremove::{remove_background_from_reader, PipelineOptions, Precision, SubjectModel};
//! use tokio::fs::File;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let options = PipelineOptions::builder()
//!     .model(SubjectModel::Product)
//!     .precision(Precision::Precise)
//!     .build()?;
//!
//! let file = File::open("input.jpg").await?;
//! let result = remove_background_from_reader(file, &options).await?;
//! result.save_png("output.png")?;
//! println!("path: {}, confidence: {:.2}", result.metadata.path, result.metadata.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and tracing subscriber setup
//! - `webp-support` (default): WebP output
//! - `tracing-json`: JSON formatted tracing output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! offline-bgremove = { version = "0.1", default-features = false }
//! ```

pub mod attempts;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod processor;
pub mod services;
pub mod stages;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use image::DynamicImage;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

// Public API exports
pub use attempts::{AttemptChain, LocalPipelineAttempt, RemovalAttempt};
pub use config::{
    OutputFormat, PipelineOptions, PipelineOptionsBuilder, Precision, SubjectModel,
    MAX_EDGE_SMOOTHING,
};
pub use error::{BgRemovalError, Result};
pub use models::{ClusterWeights, ModelProfile};
pub use processor::SegmentationProcessor;
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{
    AlphaMask, ColorSample, EdgeMap, LabSample, LabelMap, MaskStatistics, PipelinePath,
    PipelineResult, ProcessingMetadata, ProcessingTimings, RasterBuffer,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from a decoded RGBA buffer on the current thread
///
/// This is the synchronous core entry point. Async callers should prefer
/// [`remove_background_from_image`] or an [`AttemptChain`], which move the
/// CPU-bound work onto a blocking worker.
///
/// # Examples
///
/// ```rust
/// use offline_bgremove::{remove_background, PipelineOptions, RasterBuffer};
///
/// let mut input = RasterBuffer::filled(48, 48, [250, 250, 250, 255])?;
/// for y in 16..32 {
///     for x in 16..32 {
///         input.set_pixel(x, y, [200, 30, 30, 255]);
///     }
/// }
/// let options = PipelineOptions::builder().seed(1).build()?;
/// let result = remove_background(&input, &options)?;
/// assert_eq!(result.dimensions(), (48, 48));
/// assert_eq!(result.mask.len(), 48 * 48);
/// # Ok::<(), offline_bgremove::BgRemovalError>(())
/// ```
pub fn remove_background(input: &RasterBuffer, options: &PipelineOptions) -> Result<PipelineResult> {
    SegmentationProcessor::new(options.clone())?.process(input)
}

/// Remove the background from a `DynamicImage`
///
/// The image is converted to RGBA8 and processed on a blocking worker.
pub async fn remove_background_from_image(
    image: &DynamicImage,
    options: &PipelineOptions,
) -> Result<PipelineResult> {
    let buffer = RasterBuffer::from_dynamic_image(image)?;
    LocalPipelineAttempt::new().attempt(&buffer, options).await
}

/// Remove the background from encoded image bytes (PNG, JPEG, WebP, TIFF)
///
/// # Examples
///
/// ```rust,no_run
/// use offline_bgremove::{remove_background_from_bytes, OutputFormat, PipelineOptions};
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let options = PipelineOptions::default();
/// let result = remove_background_from_bytes(&upload_bytes, &options).await?;
/// let png = result.to_bytes(OutputFormat::Png)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    options: &PipelineOptions,
) -> Result<PipelineResult> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    remove_background_from_image(&image, options).await
}

/// Remove the background from an async byte stream
///
/// The reader is consumed to the end before decoding.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    options: &PipelineOptions,
) -> Result<PipelineResult> {
    let image = ImageIOService::load_from_reader(reader).await?;
    remove_background_from_image(&image, options).await
}

/// Run the pipeline with a caller-side time limit
///
/// When `timeout` elapses the cancellation token is fired and the call waits
/// for the worker to stop at its next stage boundary.
///
/// # Errors
/// - `Cancelled` when the time limit was exceeded
pub async fn remove_background_with_timeout(
    input: &RasterBuffer,
    options: &PipelineOptions,
    timeout: Duration,
) -> Result<PipelineResult> {
    let token = CancellationToken::new();
    let attempt = LocalPipelineAttempt::new().with_cancellation(token.clone());
    let mut work = attempt.attempt(input, options);

    match tokio::time::timeout(timeout, &mut work).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!(
                "Processing exceeded {}ms, cancelling",
                timeout.as_millis()
            );
            token.cancel();
            match work.await {
                Err(e) if e.is_cancelled() => Err(e),
                // the worker finished its last stage before observing the token
                _ => Err(BgRemovalError::cancelled(ProcessingStage::Completed.name())),
            }
        },
    }
}

/// Process independent images concurrently on blocking workers
///
/// At most `concurrency` images are in flight at a time (at least one).
/// Results are returned in input order, one per input.
///
/// # Errors
/// - `InvalidConfig` when the options fail validation; per-image failures are
///   reported in the returned vector
pub async fn remove_background_batch(
    inputs: Vec<RasterBuffer>,
    options: &PipelineOptions,
    concurrency: usize,
) -> Result<Vec<Result<PipelineResult>>> {
    use futures::stream::{self, StreamExt};

    options.validate()?;
    let concurrency = concurrency.max(1);
    log::info!(
        "Processing batch of {} image(s) with concurrency {}",
        inputs.len(),
        concurrency
    );

    let results = stream::iter(inputs.into_iter().map(|input| {
        let options = options.clone();
        async move {
            tokio::task::spawn_blocking(move || remove_background(&input, &options))
                .await
                .map_err(|e| BgRemovalError::internal(format!("Batch worker failed: {}", e)))?
        }
    }))
    .buffered(concurrency)
    .collect::<Vec<_>>()
    .await;

    Ok(results)
}
