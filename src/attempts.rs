//! First-success-wins removal attempts
//!
//! Applications that can reach external removal services put them in front of
//! the local pipeline with an [`AttemptChain`]. The crate itself only ships the
//! network-free [`LocalPipelineAttempt`].

use crate::{
    config::PipelineOptions,
    error::{BgRemovalError, Result},
    processor::SegmentationProcessor,
    services::ProgressTracker,
    types::{PipelineResult, RasterBuffer},
};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

/// One way of producing a background-removed image
#[async_trait]
pub trait RemovalAttempt: Send + Sync {
    /// Short label used in logs and in `AllAttemptsFailed`
    fn name(&self) -> &str;

    /// Produce a result for `input` or fail
    async fn attempt(
        &self,
        input: &RasterBuffer,
        options: &PipelineOptions,
    ) -> Result<PipelineResult>;
}

/// Runs [`SegmentationProcessor`] on a blocking worker thread
#[derive(Debug, Clone, Default)]
pub struct LocalPipelineAttempt {
    cancellation: Option<CancellationToken>,
    report_progress: bool,
}

impl LocalPipelineAttempt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `token` at every stage boundary
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Log stage progress through the console reporter
    #[must_use]
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.report_progress = enabled;
        self
    }
}

#[async_trait]
impl RemovalAttempt for LocalPipelineAttempt {
    fn name(&self) -> &str {
        "local-pipeline"
    }

    async fn attempt(
        &self,
        input: &RasterBuffer,
        options: &PipelineOptions,
    ) -> Result<PipelineResult> {
        let mut processor = SegmentationProcessor::new(options.clone())?;
        if let Some(ref token) = self.cancellation {
            processor = processor.with_cancellation(token.clone());
        }
        if self.report_progress {
            processor = processor.with_progress_tracker(ProgressTracker::console(false));
        }

        let input = input.clone();
        tokio::task::spawn_blocking(move || processor.process(&input))
            .await
            .map_err(|e| BgRemovalError::internal(format!("Pipeline worker failed: {}", e)))?
    }
}

/// Ordered list of attempts; the first success wins
#[derive(Default)]
pub struct AttemptChain {
    attempts: Vec<Box<dyn RemovalAttempt>>,
}

impl std::fmt::Debug for AttemptChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.attempts.iter().map(|a| a.name()))
            .finish()
    }
}

impl AttemptChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain containing only the local pipeline
    #[must_use]
    pub fn local() -> Self {
        Self::new().then(LocalPipelineAttempt::new())
    }

    /// Append an attempt to the end of the chain
    #[must_use]
    pub fn then<A: RemovalAttempt + 'static>(mut self, attempt: A) -> Self {
        self.attempts.push(Box::new(attempt));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Try each attempt in order
    ///
    /// # Errors
    /// - `Cancelled` as soon as any attempt reports a cancellation
    /// - `AllAttemptsFailed` with one `"name: error"` entry per attempt otherwise
    pub async fn run(
        &self,
        input: &RasterBuffer,
        options: &PipelineOptions,
    ) -> Result<PipelineResult> {
        let mut failures = Vec::with_capacity(self.attempts.len());

        for attempt in &self.attempts {
            debug!("Trying removal attempt '{}'", attempt.name());
            match attempt.attempt(input, options).await {
                Ok(result) => {
                    info!("Removal attempt '{}' succeeded", attempt.name());
                    return Ok(result);
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Removal attempt '{}' failed: {}", attempt.name(), e);
                    failures.push(format!("{}: {}", attempt.name(), e));
                },
            }
        }

        Err(BgRemovalError::AllAttemptsFailed(failures))
    }
}
