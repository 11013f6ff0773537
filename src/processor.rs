//! Headless dust removal processor
//!
//! `DustRemovalProcessor` runs the whole pipeline (detect, threshold, dilate,
//! inpaint, blend, save) without an interactive session. The individual steps
//! are also exposed as free functions so the session's background tasks run
//! exactly the same code.

use crate::{
    config::{BackendType, DetectionConfig, DustRemovalConfig, InpaintMethod, InpaintingConfig, OutputFormat},
    detection::{self, ProgressSpan},
    error::{DustRemovalError, Result},
    inference::SegmentationBackend,
    inpaint::{blend, InpaintStrategy},
    mask::{binarize, dilate, BinaryMask},
    models::ModelManager,
    services::{ImageIOService, OutputFormatHandler, ProcessingStage, ProgressTracker},
    types::{DetectionResult, ImageSize, ProcessingTimings, RemovalResult},
};
use image::{DynamicImage, GrayImage, RgbImage};
use instant::Instant;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tracing::{instrument, span, Level};

#[allow(clippy::cast_possible_truncation)]
fn millis(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type
    ///
    /// `model_manager` is `None` when the weights should be resolved from the
    /// execution config at initialization.
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: Option<ModelManager>,
    ) -> Result<Box<dyn SegmentationBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the backends enabled at compile time
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: Option<ModelManager>,
    ) -> Result<Box<dyn SegmentationBackend>> {
        match backend_type {
            #[cfg(feature = "tract")]
            BackendType::Tract => {
                use crate::backends::TractBackend;
                Ok(Box::new(model_manager.map_or_else(
                    TractBackend::new,
                    TractBackend::with_model_manager,
                )))
            },
            #[cfg(feature = "onnx")]
            BackendType::Onnx => {
                use crate::backends::OnnxBackend;
                Ok(Box::new(model_manager.map_or_else(
                    OnnxBackend::new,
                    OnnxBackend::with_model_manager,
                )))
            },
            #[allow(unreachable_patterns)]
            other => {
                let _ = model_manager;
                Err(DustRemovalError::invalid_config(format!(
                    "{other} backend not compiled in (enable the '{other}' feature)"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        backends
    }
}

/// Build the fill strategy for `config`, loading the deep model if requested
///
/// A deep model that cannot be loaded is logged and left out; the strategy
/// then falls back to single-pass Telea on every call.
#[must_use]
pub fn build_inpaint_strategy(config: &InpaintingConfig) -> InpaintStrategy {
    if config.method != InpaintMethod::Deep {
        return InpaintStrategy::from_config(config, None);
    }

    #[cfg(feature = "tract")]
    let model: Option<std::sync::Arc<dyn crate::inpaint::DeepInpaintModel>> =
        match config.deep_model.as_deref() {
            Some(path) => match crate::inpaint::TractLamaInpainter::load(path, config.deep_model_resolution) {
                Ok(model) => Some(std::sync::Arc::new(model)),
                Err(e) => {
                    log::warn!("⚠️ Could not load deep inpainting model: {e}");
                    None
                },
            },
            None => {
                log::warn!("⚠️ Deep inpainting selected but no model path configured");
                None
            },
        };
    #[cfg(not(feature = "tract"))]
    let model = {
        log::warn!("⚠️ Deep inpainting needs the 'tract' feature");
        None
    };

    InpaintStrategy::from_config(config, model)
}

/// Run detection on `gray` and threshold the resulting map
///
/// # Errors
/// - Backend not initialized or network failure
/// - Invalid detection settings
pub fn detect_dust(
    gray: &GrayImage,
    backend: &mut dyn SegmentationBackend,
    config: &DetectionConfig,
    span: ProgressSpan,
    progress: &mut dyn FnMut(f32),
) -> Result<DetectionResult> {
    let start = Instant::now();
    let probability = detection::detect(gray, backend, config, span, progress)?;
    let elapsed = start.elapsed();
    let mask = binarize(&probability, config.threshold);
    debug!(
        "Threshold {} flags {:.3}% of pixels",
        config.threshold,
        mask.coverage() * 100.0
    );
    Ok(DetectionResult {
        probability,
        mask,
        elapsed,
    })
}

/// Dilate `mask`, fill it with `strategy` and blend the fill into `image`
///
/// The mask is brought to the image size with nearest-neighbour resampling
/// first. An all-off mask skips the fill and returns the image unchanged.
///
/// # Errors
/// - Empty image
/// - Invalid dilation kernel
/// - Classical inpainting failure
#[instrument(skip_all, fields(width = image.width(), height = image.height(), strategy = strategy.name()))]
pub fn remove_dust(
    image: &RgbImage,
    mask: &BinaryMask,
    config: &InpaintingConfig,
    strategy: &InpaintStrategy,
) -> Result<RemovalResult> {
    let total_start = Instant::now();
    let mut timings = ProcessingTimings::default();
    let size = ImageSize::new(image.width(), image.height());
    if size.is_empty() {
        return Err(DustRemovalError::inpainting("Cannot inpaint an empty image"));
    }

    let dilated_mask = {
        let _span = span!(Level::DEBUG, "dilation", kernel = config.dilation_kernel).entered();
        let start = Instant::now();
        let working = if mask.size() == size {
            dilate(mask, config.dilation_kernel)?
        } else {
            dilate(&mask.resize_nearest(size), config.dilation_kernel)?
        };
        timings.dilation_ms = millis(start);
        working
    };

    let result = if dilated_mask.is_all_off() {
        debug!("Mask is empty, nothing to inpaint");
        image.clone()
    } else {
        let filled = {
            let _span = span!(Level::INFO, "inpainting", strategy = strategy.name()).entered();
            let start = Instant::now();
            let filled = strategy.inpaint(image, &dilated_mask)?;
            timings.inpainting_ms = millis(start);
            filled
        };
        let _span = span!(Level::DEBUG, "blending").entered();
        let start = Instant::now();
        let blended = blend(image, &filled, &dilated_mask);
        timings.blending_ms = millis(start);
        blended
    };

    timings.total_ms = millis(total_start);
    Ok(RemovalResult {
        image: result,
        dilated_mask,
        timings,
    })
}

/// Result of processing one image headlessly
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub detection: DetectionResult,
    pub removal: RemovalResult,
}

/// Files written for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedOutput {
    pub image: PathBuf,
    pub mask: Option<PathBuf>,
}

/// Headless pipeline for CLI and batch use
pub struct DustRemovalProcessor {
    config: DustRemovalConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn SegmentationBackend>>,
    strategy: Option<InpaintStrategy>,
    model_load_ms: u64,
    initialized: bool,
    progress_tracker: Option<ProgressTracker>,
}

impl DustRemovalProcessor {
    /// Create a processor with the default backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: DustRemovalConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: DustRemovalConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: None,
            strategy: None,
            model_load_ms: 0,
            initialized: false,
            progress_tracker: None,
        })
    }

    /// Create a processor around an already constructed backend
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_backend(
        config: DustRemovalConfig,
        backend: Box<dyn SegmentationBackend>,
    ) -> Result<Self> {
        let mut processor = Self::new(config)?;
        processor.backend = Some(backend);
        Ok(processor)
    }

    /// Attach a progress tracker
    pub fn set_progress_tracker(&mut self, tracker: ProgressTracker) {
        self.progress_tracker = Some(tracker);
    }

    #[must_use]
    pub fn config(&self) -> &DustRemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Backend types this build can create
    #[must_use]
    pub fn available_backends(&self) -> Vec<BackendType> {
        self.backend_factory.available_backends()
    }

    fn report(&mut self, stage: ProcessingStage) {
        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.report_stage(stage);
        }
    }

    fn report_error(&self, error: &DustRemovalError) {
        if let Some(ref tracker) = self.progress_tracker {
            tracker.report_error(&error.to_string());
        }
    }

    /// Create and initialize the backend and load the inpainting strategy
    ///
    /// # Errors
    /// - Backend type not available
    /// - Weights missing, unreadable or not matching the network
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        info!("Initializing dust removal processor");
        debug!("Backend: {}", self.config.execution.backend);
        debug!("Execution provider: {}", self.config.execution.provider);
        self.report(ProcessingStage::ModelLoading);

        let mut backend = match self.backend.take() {
            Some(backend) => backend,
            None => {
                let model_manager = self
                    .config
                    .execution
                    .model_path
                    .as_deref()
                    .map(ModelManager::from_path)
                    .transpose()?;
                self.backend_factory
                    .create_backend(self.config.execution.backend, model_manager)?
            },
        };

        let initialized = backend.initialize(&self.config.execution);
        let load_time = match initialized {
            Ok(load_time) => load_time,
            Err(e) => {
                self.report_error(&e);
                self.backend = Some(backend);
                return Err(e);
            },
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            self.model_load_ms = load_time.map_or(0, |t| t.as_millis() as u64);
        }

        self.strategy = Some(build_inpaint_strategy(&self.config.inpainting));
        self.backend = Some(backend);
        self.initialized = true;

        info!("Dust removal processor initialized successfully");
        Ok(())
    }

    /// Detect dust in `image` with the configured threshold
    ///
    /// # Errors
    /// - Initialization failure
    /// - Inference failure
    #[instrument(skip(self, image), fields(dimensions = %format!("{}x{}", image.width(), image.height())))]
    pub fn detect(&mut self, image: &DynamicImage) -> Result<DetectionResult> {
        self.initialize()?;
        let gray = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            self.report(ProcessingStage::Preprocessing);
            image.to_luma8()
        };

        let (start, end) = ProcessingStage::detection_range();
        let config = &self.config.detection;
        let tracker = &mut self.progress_tracker;
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or_else(|| DustRemovalError::internal("Backend missing after initialization"))?;

        let _span = span!(Level::INFO, "detection", backend = backend.name()).entered();
        detect_dust(
            &gray,
            backend,
            config,
            ProgressSpan::new(start, end),
            &mut |percentage| {
                if let Some(tracker) = tracker.as_mut() {
                    tracker.report_percentage(ProcessingStage::Detection, percentage);
                }
            },
        )
    }

    /// Detect and remove dust from `image`
    ///
    /// # Errors
    /// - Initialization or inference failure
    /// - Classical inpainting failure
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.execution.backend,
            method = %self.config.inpainting.method,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<ProcessedImage> {
        let total_start = Instant::now();
        let result = self.run_pipeline(image);
        match result {
            Ok(mut processed) => {
                processed.removal.timings.total_ms = millis(total_start);
                Ok(processed)
            },
            Err(e) => {
                self.report_error(&e);
                Err(e)
            },
        }
    }

    fn run_pipeline(&mut self, image: &DynamicImage) -> Result<ProcessedImage> {
        let detection = self.detect(image)?;

        self.report(ProcessingStage::MaskGeneration);
        let threshold_start = Instant::now();
        let mask = detection.mask.clone();
        let thresholding_ms = millis(threshold_start);

        self.report(ProcessingStage::Dilation);
        let rgb = image.to_rgb8();
        let strategy = self.strategy.clone().unwrap_or_default();
        self.report(ProcessingStage::Inpainting);
        let mut removal = remove_dust(&rgb, &mask, &self.config.inpainting, &strategy)?;
        self.report(ProcessingStage::Blending);

        #[allow(clippy::cast_possible_truncation)]
        {
            removal.timings.detection_ms = detection.elapsed.as_millis() as u64;
        }
        removal.timings.thresholding_ms = thresholding_ms;
        removal.timings.model_load_ms = self.model_load_ms;
        Ok(ProcessedImage { detection, removal })
    }

    /// Process one file and write the result
    ///
    /// The output goes next to `input` (or into `output_dir`) as
    /// `<stem><suffix>.<ext>`. With `save_mask` the dilated mask is written
    /// alongside as `<output stem>_mask.png`.
    ///
    /// # Errors
    /// - Input cannot be read or decoded
    /// - Processing failure
    /// - Output cannot be written
    #[instrument(skip(self), fields(input = %input.display()))]
    pub fn process_file(
        &mut self,
        input: &Path,
        output_dir: Option<&Path>,
        save_mask: bool,
    ) -> Result<(SavedOutput, ProcessingTimings)> {
        self.report(ProcessingStage::ImageLoading);
        let decode_start = Instant::now();
        let image = match ImageIOService::load_image(input) {
            Ok(image) => image,
            Err(e) => {
                self.report_error(&e);
                return Err(e);
            },
        };
        let image_decode_ms = millis(decode_start);

        let total_start = Instant::now();
        let processed = self.process_image(&image)?;
        let mut timings = processed.removal.timings.clone();
        timings.image_decode_ms = image_decode_ms;

        self.report(ProcessingStage::FileSaving);
        let format = OutputFormatHandler::resolve_format(input, self.config.output.format);
        let output_path =
            OutputFormatHandler::output_path(input, output_dir, format, &self.config.output.suffix);
        let encode_start = Instant::now();
        let saved = self.save(&processed.removal, &output_path, format, save_mask);
        if let Err(ref e) = saved {
            self.report_error(e);
        }
        let saved = saved?;
        timings.image_encode_ms = Some(millis(encode_start));
        timings.total_ms = millis(total_start) + image_decode_ms;

        self.report(ProcessingStage::Completed);
        if let Some(ref tracker) = self.progress_tracker {
            tracker.report_completion(&timings);
        }
        info!(
            "{} -> {} ({:.2}% dust)",
            input.display(),
            saved.image.display(),
            processed.detection.coverage() * 100.0
        );
        Ok((saved, timings))
    }

    fn save(
        &self,
        removal: &RemovalResult,
        output_path: &Path,
        format: OutputFormat,
        save_mask: bool,
    ) -> Result<SavedOutput> {
        let image = DynamicImage::ImageRgb8(removal.image.clone());
        ImageIOService::save_image(&image, output_path, format, self.config.output.jpeg_quality)?;
        let mask = if save_mask {
            let mask_path = OutputFormatHandler::mask_path(output_path);
            ImageIOService::save_mask(&removal.dilated_mask, &mask_path)?;
            Some(mask_path)
        } else {
            None
        };
        Ok(SavedOutput {
            image: output_path.to_path_buf(),
            mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBehavior, MockSegmentationBackend};
    use crate::config::{ExecutionConfig, PredictionStrategy};
    use image::{Luma, Rgb};
    use tempfile::tempdir;

    struct MockFactory;

    impl BackendFactory for MockFactory {
        fn create_backend(
            &self,
            _backend_type: BackendType,
            _model_manager: Option<ModelManager>,
        ) -> Result<Box<dyn SegmentationBackend>> {
            Ok(Box::new(MockSegmentationBackend::new(MockBehavior::Darkness)))
        }

        fn available_backends(&self) -> Vec<BackendType> {
            vec![BackendType::Tract]
        }
    }

    fn specked_image() -> RgbImage {
        let mut image = RgbImage::from_pixel(48, 40, Rgb([200, 180, 160]));
        for y in 18..22 {
            for x in 20..24 {
                image.put_pixel(x, y, Rgb([5, 5, 5]));
            }
        }
        image
    }

    fn small_config() -> DustRemovalConfig {
        DustRemovalConfig::builder()
            .threshold(0.5)
            .window_size(16)
            .stride(8)
            .inpaint_method(InpaintMethod::Telea)
            .dilation_kernel(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_remove_dust_with_empty_mask_is_identity() {
        let image = specked_image();
        let mask = BinaryMask::new(48, 40);
        let result = remove_dust(
            &image,
            &mask,
            &InpaintingConfig::default(),
            &InpaintStrategy::default(),
        )
        .unwrap();
        assert_eq!(result.image, image);
        assert!(result.dilated_mask.is_all_off());
    }

    #[test]
    fn test_remove_dust_resizes_low_res_mask() {
        let image = specked_image();
        let mut mask = BinaryMask::new(24, 20);
        mask.set(11, 10, true);
        let result = remove_dust(
            &image,
            &mask,
            &InpaintingConfig::default(),
            &InpaintStrategy::ClassicalSingle { radius: 3.0 },
        )
        .unwrap();
        assert_eq!(result.dilated_mask.size(), ImageSize::new(48, 40));
        assert!(result.dilated_mask.is_on(22, 20));
    }

    #[test]
    fn test_detect_dust_thresholds_map() {
        let mut gray = GrayImage::from_pixel(32, 32, Luma([255]));
        gray.put_pixel(5, 5, Luma([0]));
        let mut backend = MockSegmentationBackend::new(MockBehavior::Darkness);
        backend.initialize(&ExecutionConfig::default()).unwrap();
        let config = DetectionConfig {
            threshold: 0.5,
            window_size: 16,
            stride: 16,
            ..Default::default()
        };
        let result = detect_dust(&gray, &mut backend, &config, ProgressSpan::default(), &mut |_| {}).unwrap();
        assert!(result.mask.is_on(5, 5));
        assert_eq!(result.mask.count_on(), 1);
    }

    #[test]
    fn test_processor_removes_dark_speck() {
        let mut processor = DustRemovalProcessor::with_factory(small_config(), Box::new(MockFactory)).unwrap();
        let image = DynamicImage::ImageRgb8(specked_image());
        let processed = processor.process_image(&image).unwrap();

        assert!(processed.detection.mask.is_on(21, 19));
        let fixed = processed.removal.image.get_pixel(21, 19);
        assert!(fixed[0] > 100, "speck should be filled from surroundings, got {fixed:?}");
        assert_eq!(processed.removal.image.get_pixel(2, 2), &Rgb([200, 180, 160]));
        assert!(processor.is_initialized());
    }

    #[test]
    fn test_processor_failing_backend_reports_error() {
        let mut processor = DustRemovalProcessor::with_backend(
            small_config(),
            Box::new(MockSegmentationBackend::new_failing_init()),
        )
        .unwrap();
        assert!(processor.initialize().is_err());
        assert!(!processor.is_initialized());
    }

    #[test]
    fn test_process_file_writes_output_and_mask() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("frame.png");
        specked_image().save(&input).unwrap();

        let config = DustRemovalConfig {
            detection: DetectionConfig {
                strategy: PredictionStrategy::ResizeOnce,
                resize_resolution: 32,
                threshold: 0.5,
                ..Default::default()
            },
            ..small_config()
        };
        let mut processor = DustRemovalProcessor::with_factory(config, Box::new(MockFactory)).unwrap();
        processor.set_progress_tracker(ProgressTracker::no_op());
        let (saved, timings) = processor.process_file(&input, Some(&dir.path().join("out")), true).unwrap();

        assert_eq!(saved.image, dir.path().join("out/frame_dust_removal.png"));
        assert!(saved.image.exists());
        assert!(saved.mask.as_ref().is_some_and(|p| p.exists()));
        assert!(timings.image_encode_ms.is_some());
        assert_eq!(
            OutputFormatHandler::resolve_format(&saved.image, None),
            OutputFormat::Png
        );
    }

    #[test]
    fn test_default_factory_lists_compiled_backends() {
        let factory = DefaultBackendFactory;
        let backends = factory.available_backends();
        #[cfg(feature = "tract")]
        assert!(backends.contains(&BackendType::Tract));
        #[cfg(not(feature = "onnx"))]
        assert!(factory.create_backend(BackendType::Onnx, None).is_err());
        let _ = backends;
    }

    #[test]
    fn test_build_strategy_without_deep_model_falls_back() {
        let config = InpaintingConfig {
            method: InpaintMethod::Deep,
            deep_model: None,
            ..Default::default()
        };
        match build_inpaint_strategy(&config) {
            InpaintStrategy::Deep { model, .. } => assert!(model.is_none()),
            other => panic!("unexpected strategy {}", other.name()),
        }
    }
}
