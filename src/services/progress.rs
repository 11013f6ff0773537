//! Stage and percentage reporting for a dust removal run
//!
//! The pipeline only talks to a [`ProgressTracker`]. What happens with the
//! updates (an indicatif bar, session observers, log lines) is up to the
//! [`ProgressReporter`] it wraps.

use crate::types::ProcessingTimings;
use instant::Instant;

/// Progress stages of a dust removal run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading segmentation weights and preparing the backend
    ModelLoading,
    /// Loading and decoding the input image
    ImageLoading,
    /// Grayscale conversion and normalisation
    Preprocessing,
    /// Running patch inference (reports inside its sub-range)
    Detection,
    /// Thresholding the probability map
    MaskGeneration,
    /// Growing the mask before inpainting
    Dilation,
    /// Filling the masked pixels
    Inpainting,
    /// Recombining the fill with the original
    Blending,
    /// Writing the result to disk
    FileSaving,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ModelLoading => "Loading dust detection model",
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Preprocessing => "Preparing image for detection",
            ProcessingStage::Detection => "Detecting dust",
            ProcessingStage::MaskGeneration => "Generating dust mask",
            ProcessingStage::Dilation => "Dilating dust mask",
            ProcessingStage::Inpainting => "Inpainting dust regions",
            ProcessingStage::Blending => "Blending result",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Nominal progress percentage when the stage starts
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ModelLoading => 5,
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::Preprocessing => 15,
            ProcessingStage::Detection => 20,
            ProcessingStage::MaskGeneration => 65,
            ProcessingStage::Dilation => 70,
            ProcessingStage::Inpainting => 90,
            ProcessingStage::Blending => 95,
            ProcessingStage::FileSaving => 99,
            ProcessingStage::Completed => 100,
        }
    }

    /// Overall progress range detection reports into
    #[must_use]
    pub fn detection_range() -> (f32, f32) {
        (20.0, 60.0)
    }
}

/// One step of a run: where it is and how long it has been going
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Milliseconds since the tracker was created
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Update at an explicit percentage inside a stage
    #[must_use]
    pub fn at_percentage(stage: ProcessingStage, percentage: f32, start_time: Instant) -> Self {
        Self {
            progress: percentage.round().clamp(0.0, 100.0) as u8,
            ..Self::new(stage, start_time)
        }
    }

    /// Nominal percentage of `stage`, but a caller-provided message
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            description,
            ..Self::new(stage, start_time)
        }
    }
}

/// Sink for the updates a [`ProgressTracker`] produces
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, update: ProgressUpdate);

    /// Called once per image with the stage durations
    fn report_completion(&self, timings: &ProcessingTimings);

    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Reporter for library callers that do not care about progress
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Writes every update as a `log` line
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "{:>3}% {} [+{}ms]",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("{:>3}% {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        if self.verbose {
            log::info!("🧹 {}", timings.summary());
        } else {
            log::info!("🧹 Frame cleaned in {}ms", timings.total_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ {} failed: {error}", stage.description());
    }
}

/// Owns the run clock and forwards stage changes to a reporter
///
/// Errors are attributed to the last stage reported.
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Tracker that discards everything
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report the start of `stage` at its nominal percentage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report a percentage inside `stage`
    pub fn report_percentage(&mut self, stage: ProcessingStage, percentage: f32) {
        self.current_stage = Some(stage);
        self.reporter.report_progress(ProgressUpdate::at_percentage(
            stage,
            percentage,
            self.start_time,
        ));
    }

    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::with_description(stage, description, self.start_time);
        self.reporter.report_progress(update);
    }

    pub fn report_completion(&self, timings: &ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::ModelLoading);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
