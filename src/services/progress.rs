//! Progress reporting service
//!
//! Stage boundaries are the unit of progress reporting; this module keeps that
//! concern out of the pipeline so every frontend can render it its own way.

use crate::types::ProcessingTimings;
use instant::Instant;

/// Progress stages of a single pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Converting sRGB pixels to L*a*b*
    ColorConversion,
    /// Computing the multi-scale edge map
    EdgeDetection,
    /// Estimating background colours from the border
    BackgroundSampling,
    /// K-means clustering
    Clustering,
    /// Selecting foreground clusters
    Classification,
    /// Building the initial alpha mask
    MaskBuilding,
    /// Energy relaxation of the mask
    Refinement,
    /// Morphological cleanup
    Morphology,
    /// Boundary smoothing and compositing
    Smoothing,
    /// Threshold-only recovery path
    Fallback,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Stages of the advanced path in execution order
    pub const PIPELINE: [ProcessingStage; 9] = [
        Self::ColorConversion,
        Self::EdgeDetection,
        Self::BackgroundSampling,
        Self::Clustering,
        Self::Classification,
        Self::MaskBuilding,
        Self::Refinement,
        Self::Morphology,
        Self::Smoothing,
    ];

    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ColorConversion => "Converting colors to LAB",
            Self::EdgeDetection => "Detecting edges",
            Self::BackgroundSampling => "Sampling background colors",
            Self::Clustering => "Clustering pixels",
            Self::Classification => "Classifying foreground clusters",
            Self::MaskBuilding => "Building alpha mask",
            Self::Refinement => "Refining mask",
            Self::Morphology => "Cleaning up mask",
            Self::Smoothing => "Smoothing edges",
            Self::Fallback => "Running fallback segmentation",
            Self::Completed => "Processing completed",
        }
    }

    /// Short machine-friendly stage name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorConversion => "color_conversion",
            Self::EdgeDetection => "edge_detection",
            Self::BackgroundSampling => "background_sampling",
            Self::Clustering => "clustering",
            Self::Classification => "classification",
            Self::MaskBuilding => "mask_building",
            Self::Refinement => "refinement",
            Self::Morphology => "morphology",
            Self::Smoothing => "smoothing",
            Self::Fallback => "fallback",
            Self::Completed => "completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::ColorConversion => 5,
            Self::EdgeDetection => 15,
            Self::BackgroundSampling => 25,
            Self::Clustering => 35,
            Self::Classification => 55,
            Self::MaskBuilding => 60,
            Self::Refinement => 70,
            Self::Morphology => 80,
            Self::Smoothing => 90,
            Self::Fallback => 60,
            Self::Completed => 100,
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Trait for reporting progress during background removal
///
/// Implementations must be `Send + Sync` because the pipeline runs on a
/// blocking worker thread.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report an error during processing
    ///
    /// # Arguments
    /// * `stage` - Stage where error occurred
    /// * `error` - Error description
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show elapsed time and per-stage timings
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("✅ Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Color conversion: {}ms", timings.color_conversion_ms);
            log::info!("    • Edge detection: {}ms", timings.edge_detection_ms);
            log::info!("    • Background sampling: {}ms", timings.background_sampling_ms);
            log::info!(
                "    • Clustering: {}ms",
                timings.clustering_ms + timings.classification_ms
            );
            log::info!("    • Mask building: {}ms", timings.mask_building_ms);
            log::info!("    • Refinement: {}ms", timings.refinement_ms);
            log::info!("    • Morphology: {}ms", timings.morphology_ms);
            log::info!("    • Smoothing: {}ms", timings.smoothing_ms);
            if timings.fallback_ms > 0 {
                log::info!("    • Fallback: {}ms", timings.fallback_ms);
            }
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Progress tracker that manages timing and progress reporting
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::new(stage, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report progress with custom description
    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::with_description(stage, description, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the most recently reported stage
    pub fn report_error(&self, error: &str) {
        let stage = self
            .current_stage
            .unwrap_or(ProcessingStage::ColorConversion);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Test progress reporter that captures reports for verification
    #[derive(Default)]
    struct TestProgressReporter {
        progress_updates: Arc<Mutex<Vec<ProgressUpdate>>>,
        completions: Arc<Mutex<Vec<ProcessingTimings>>>,
        errors: Arc<Mutex<Vec<(ProcessingStage, String)>>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.progress_updates.lock().unwrap().push(update);
        }

        fn report_completion(&self, timings: ProcessingTimings) {
            self.completions.lock().unwrap().push(timings);
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_processing_stage_descriptions() {
        assert_eq!(
            ProcessingStage::Clustering.description(),
            "Clustering pixels"
        );
        assert_eq!(
            ProcessingStage::Completed.description(),
            "Processing completed"
        );
        assert_eq!(ProcessingStage::MaskBuilding.to_string(), "mask_building");
    }

    #[test]
    fn test_pipeline_progress_is_monotonic() {
        let percentages: Vec<u8> = ProcessingStage::PIPELINE
            .iter()
            .map(ProcessingStage::progress_percentage)
            .collect();
        assert!(percentages.windows(2).all(|w| w[0] < w[1]));
        assert!(percentages.iter().all(|&p| p < ProcessingStage::Completed.progress_percentage()));
    }

    #[test]
    fn test_progress_update_creation() {
        let update = ProgressUpdate::new(ProcessingStage::Refinement, Instant::now());

        assert_eq!(update.stage, ProcessingStage::Refinement);
        assert_eq!(update.progress, 70);
        assert_eq!(update.description, "Refining mask");
        assert!(update.elapsed_ms < 100);
    }

    #[test]
    fn test_no_op_progress_reporter() {
        let reporter = NoOpProgressReporter;
        let update = ProgressUpdate::new(ProcessingStage::Smoothing, Instant::now());

        reporter.report_progress(update);
        reporter.report_completion(ProcessingTimings::default());
        reporter.report_error(ProcessingStage::Smoothing, "test error");
    }

    #[test]
    fn test_progress_tracker() {
        let test_reporter = TestProgressReporter::default();
        let progress_updates = test_reporter.progress_updates.clone();
        let completions = test_reporter.completions.clone();
        let errors = test_reporter.errors.clone();

        let mut tracker = ProgressTracker::new(Box::new(test_reporter));
        assert!(tracker.current_stage().is_none());

        tracker.report_stage(ProcessingStage::ColorConversion);
        tracker.report_stage_with_description(
            ProcessingStage::Fallback,
            "Falling back to RGB distance".to_string(),
        );
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Fallback));

        tracker.report_completion(ProcessingTimings::default());
        tracker.report_error("boom");

        let updates = progress_updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].description, "Falling back to RGB distance");
        assert_eq!(completions.lock().unwrap().len(), 1);
        assert_eq!(
            errors.lock().unwrap()[0],
            (ProcessingStage::Fallback, "boom".to_string())
        );
    }
}
