//! Segmentation processor
//!
//! `SegmentationProcessor` threads the pipeline stages together, owns every
//! intermediate buffer and implements the whole-pipeline fallback:
//!
//! ```text
//! ColorConvert -> EdgeDetect -> BackgroundSample
//!     -> {Cluster | ColorDistance} -> Refine -> Morphology -> Smooth -> Done
//!     \-> (AlgorithmFailure) Fallback: RGB distance -> light smoothing -> Done
//! ```
//!
//! Cancellation is checked and progress reported at every stage boundary.

use crate::{
    config::PipelineOptions,
    error::{BgRemovalError, Result},
    models::ModelProfile,
    services::{ProcessingStage, ProgressTracker},
    stages::{
        self,
        background::BackgroundColor,
        color::LabImage,
        mask::{DistanceMask, MaskSeed},
    },
    types::{
        AlphaMask, EdgeMap, LabelMap, PipelinePath, PipelineResult, ProcessingMetadata,
        ProcessingTimings, RasterBuffer, OPAQUE_CUTOFF,
    },
};
use instant::Instant;
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, span, Level};

/// Smoothing passes the fallback path applies at most
const FALLBACK_SMOOTHING_PASSES: u8 = 1;

/// Foreground-ratio window outside which confidence is discounted
const PLAUSIBLE_COVERAGE: (f32, f32) = (0.02, 0.9);
const IMPLAUSIBLE_COVERAGE_FACTOR: f32 = 0.6;

/// Random source for sampling and K-means seeding
#[must_use]
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Products of stages 1-3, shared by both paths
struct SharedStages {
    lab: LabImage,
    edges: EdgeMap,
    background: Vec<BackgroundColor>,
}

/// What a path hands back to `finalize`
struct PathOutcome {
    path: PipelinePath,
    mask: AlphaMask,
    working: RasterBuffer,
    label_map: Option<LabelMap>,
}

/// Runs the segmentation pipeline for one image at a time
pub struct SegmentationProcessor {
    options: PipelineOptions,
    progress_tracker: Option<ProgressTracker>,
    cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for SegmentationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationProcessor")
            .field("options", &self.options)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl SegmentationProcessor {
    /// Create a processor for the given options
    ///
    /// # Errors
    /// - `InvalidConfig` if the options fail validation
    pub fn new(options: PipelineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            progress_tracker: None,
            cancellation: None,
        })
    }

    /// Report stage progress to `tracker`
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    /// Abort at the next stage boundary once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the pipeline on one image
    ///
    /// Either a complete result is returned or a terminal error; recoverable
    /// failures in the advanced path switch to the fallback path exactly once.
    ///
    /// # Errors
    /// - `Cancelled` when the token fires before a stage starts
    /// - `AlgorithmFailure` only if the fallback path itself fails
    #[instrument(
        skip(self, input),
        fields(
            model = %self.options.model,
            precision = %self.options.precision,
            dimensions = %format!("{}x{}", input.width(), input.height())
        )
    )]
    pub fn process(&mut self, input: &RasterBuffer) -> Result<PipelineResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let profile = ModelProfile::for_model(self.options.model);
        let mut rng = seeded_rng(self.options.seed);

        info!(
            "Segmenting {}x{} image (model: {}, precision: {})",
            input.width(),
            input.height(),
            self.options.model,
            self.options.precision
        );

        let shared = self.run_shared_stages(input, &mut rng, &mut timings)?;

        let outcome = match self.run_advanced(input, &shared, profile, &mut rng, &mut timings) {
            Ok(outcome) => outcome,
            Err(e) if e.is_recoverable() => {
                warn!("Advanced path failed, switching to fallback: {}", e);
                if let Some(ref tracker) = self.progress_tracker {
                    tracker.report_error(&e.to_string());
                }
                let fallback_start = Instant::now();
                let outcome = self.run_fallback(input, &shared, profile)?;
                timings.fallback_ms = fallback_start.elapsed().as_millis() as u64;
                return self.finalize(
                    input,
                    outcome,
                    &shared,
                    Some(e.to_string()),
                    timings,
                    total_start,
                );
            },
            Err(e) => return Err(e),
        };

        self.finalize(input, outcome, &shared, None, timings, total_start)
    }

    fn checkpoint(&mut self, stage: ProcessingStage) -> Result<()> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            debug!("Cancellation observed before {}", stage);
            return Err(BgRemovalError::cancelled(stage.name()));
        }
        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.report_stage(stage);
        }
        Ok(())
    }

    fn run_shared_stages(
        &mut self,
        input: &RasterBuffer,
        rng: &mut StdRng,
        timings: &mut ProcessingTimings,
    ) -> Result<SharedStages> {
        self.checkpoint(ProcessingStage::ColorConversion)?;
        let start = Instant::now();
        let lab = {
            let _span = span!(Level::DEBUG, "color_conversion").entered();
            stages::convert_buffer(input)
        };
        timings.color_conversion_ms = start.elapsed().as_millis() as u64;

        self.checkpoint(ProcessingStage::EdgeDetection)?;
        let start = Instant::now();
        let edges = {
            let _span = span!(Level::DEBUG, "edge_detection").entered();
            stages::detect_edges(input)
        };
        timings.edge_detection_ms = start.elapsed().as_millis() as u64;

        self.checkpoint(ProcessingStage::BackgroundSampling)?;
        let start = Instant::now();
        let background = {
            let _span = span!(Level::DEBUG, "background_sampling").entered();
            stages::sample_background(input, &edges, rng)
        };
        timings.background_sampling_ms = start.elapsed().as_millis() as u64;

        Ok(SharedStages {
            lab,
            edges,
            background,
        })
    }

    fn run_advanced(
        &mut self,
        input: &RasterBuffer,
        shared: &SharedStages,
        profile: &ModelProfile,
        rng: &mut StdRng,
        timings: &mut ProcessingTimings,
    ) -> Result<PathOutcome> {
        let (path, seed, working, label_map) = if self.options.precision.uses_clustering() {
            self.checkpoint(ProcessingStage::Clustering)?;
            let start = Instant::now();
            let segmentation = {
                let _span = span!(Level::INFO, "clustering").entered();
                stages::segment(&shared.lab, rng)?
            };
            timings.clustering_ms = start.elapsed().as_millis() as u64;

            self.checkpoint(ProcessingStage::Classification)?;
            let start = Instant::now();
            let selection = {
                let _span = span!(Level::DEBUG, "classification").entered();
                stages::classify_clusters(
                    &segmentation.centroids,
                    input.width(),
                    input.height(),
                    profile,
                    &shared.background,
                )?
            };
            timings.classification_ms = start.elapsed().as_millis() as u64;
            debug!("Foreground clusters: {:?}", selection.foreground);

            self.checkpoint(ProcessingStage::MaskBuilding)?;
            let start = Instant::now();
            let seed = stages::cluster_mask(&segmentation.labels, &selection);
            timings.mask_building_ms = start.elapsed().as_millis() as u64;

            (
                PipelinePath::Cluster,
                seed,
                input.clone(),
                Some(segmentation.labels),
            )
        } else {
            self.checkpoint(ProcessingStage::MaskBuilding)?;
            let start = Instant::now();
            let DistanceMask { seed, working } = {
                let _span = span!(Level::DEBUG, "mask_building").entered();
                stages::color_distance_mask(
                    input,
                    &shared.lab,
                    &shared.edges,
                    &shared.background,
                    profile.distance_threshold,
                )
            };
            timings.mask_building_ms = start.elapsed().as_millis() as u64;
            (PipelinePath::ColorDistance, seed, working, None)
        };

        let MaskSeed { mask, likelihood } = seed;

        self.checkpoint(ProcessingStage::Refinement)?;
        let start = Instant::now();
        let mask = {
            let _span = span!(Level::DEBUG, "refinement").entered();
            stages::refine(&mask, &shared.lab, &shared.edges)?
        };
        timings.refinement_ms = start.elapsed().as_millis() as u64;

        self.checkpoint(ProcessingStage::Morphology)?;
        let start = Instant::now();
        let mask = {
            let _span = span!(Level::DEBUG, "morphology").entered();
            stages::clean(
                &mask,
                &likelihood,
                self.options.precision.morphology_iterations(),
            )
        };
        timings.morphology_ms = start.elapsed().as_millis() as u64;

        self.checkpoint(ProcessingStage::Smoothing)?;
        let start = Instant::now();
        let mask = {
            let _span = span!(Level::DEBUG, "smoothing").entered();
            stages::smooth_edges(&mask, usize::from(self.options.edge_smoothing))
        };
        timings.smoothing_ms = start.elapsed().as_millis() as u64;

        Ok(PathOutcome {
            path,
            mask,
            working,
            label_map,
        })
    }

    fn run_fallback(
        &mut self,
        input: &RasterBuffer,
        shared: &SharedStages,
        profile: &ModelProfile,
    ) -> Result<PathOutcome> {
        self.checkpoint(ProcessingStage::Fallback)?;
        let _span = span!(Level::INFO, "fallback").entered();

        let DistanceMask { seed, working } = stages::rgb_distance_mask(
            input,
            &shared.edges,
            &shared.background,
            profile.distance_threshold,
        );
        let passes = self.options.edge_smoothing.min(FALLBACK_SMOOTHING_PASSES);
        let mask = stages::smooth_edges(&seed.mask, usize::from(passes));

        Ok(PathOutcome {
            path: PipelinePath::Fallback,
            mask,
            working,
            label_map: None,
        })
    }

    fn finalize(
        &mut self,
        input: &RasterBuffer,
        outcome: PathOutcome,
        shared: &SharedStages,
        fallback_reason: Option<String>,
        mut timings: ProcessingTimings,
        total_start: Instant,
    ) -> Result<PipelineResult> {
        let output = outcome.working.with_alpha(&outcome.mask)?;
        debug_assert_eq!(output.dimensions(), input.dimensions());

        timings.total_ms = total_start.elapsed().as_millis() as u64;

        let statistics = outcome.mask.statistics();
        let mut metadata = ProcessingMetadata::new(outcome.path, input.dimensions());
        metadata.processing_time_ms = timings.total_ms;
        metadata.confidence = mask_confidence(&outcome.mask);
        metadata.edge_quality = edge_quality(&outcome.mask, &shared.edges);
        metadata.fallback_reason = fallback_reason;
        metadata.foreground_ratio = statistics.foreground_ratio;
        metadata.background_colors = shared.background.iter().map(|bg| bg.color).collect();
        metadata.timings = timings.clone();

        info!(
            "Segmentation finished via {} path in {}ms (confidence {:.2}, edge quality {:.2}, foreground {:.1}%)",
            metadata.path,
            metadata.processing_time_ms,
            metadata.confidence,
            metadata.edge_quality,
            metadata.foreground_ratio * 100.0
        );

        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.report_stage(ProcessingStage::Completed);
            tracker.report_completion(timings);
        }

        Ok(PipelineResult {
            output,
            mask: outcome.mask,
            label_map: outcome.label_map,
            metadata,
        })
    }
}

/// How decisive the mask is, discounted when coverage looks implausible
///
/// Decisiveness is the mean distance of every alpha from 127.5, normalised to [0,1].
#[must_use]
pub fn mask_confidence(mask: &AlphaMask) -> f32 {
    if mask.is_empty() {
        return 0.0;
    }
    let decisiveness = mask
        .data
        .iter()
        .map(|&a| (f32::from(a) - 127.5).abs() / 127.5)
        .sum::<f32>()
        / mask.len() as f32;

    let ratio = mask.statistics().foreground_ratio;
    let coverage = if ratio > PLAUSIBLE_COVERAGE.0 && ratio < PLAUSIBLE_COVERAGE.1 {
        1.0
    } else {
        IMPLAUSIBLE_COVERAGE_FACTOR
    };
    (decisiveness * coverage).clamp(0.0, 1.0)
}

/// How strongly mask boundaries coincide with image edges
///
/// Mean of `min(1, 4*edge)` over foreground pixels that touch the background
/// through a 4-neighbour; 1.0 when the mask has no boundary.
#[must_use]
pub fn edge_quality(mask: &AlphaMask, edges: &EdgeMap) -> f32 {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let mut sum = 0.0f32;
    let mut count = 0usize;

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if mask.data[i] < OPAQUE_CUTOFF {
                continue;
            }
            let transparent = |n: usize| mask.data[n] < OPAQUE_CUTOFF;
            let on_boundary = (x > 0 && transparent(i - 1))
                || (x + 1 < width && transparent(i + 1))
                || (y > 0 && transparent(i - width))
                || (y + 1 < height && transparent(i + width));
            if on_boundary {
                sum += (4.0 * edges[[y, x]]).min(1.0);
                count += 1;
            }
        }
    }

    if count == 0 {
        1.0
    } else {
        (sum / count as f32).clamp(0.0, 1.0)
    }
}
