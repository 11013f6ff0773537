//! Configuration types for dust detection and removal

use crate::error::{DustRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default detection threshold on the probability map
pub const DEFAULT_THRESHOLD: f32 = 0.05;
/// Default tile edge for patch inference
pub const DEFAULT_WINDOW_SIZE: u32 = 1024;
/// Default step between tiles
pub const DEFAULT_STRIDE: u32 = 512;
/// Square resolution used by the resize-once strategy
pub const DEFAULT_RESIZE_RESOLUTION: u32 = 1024;
/// Default structuring element size for mask dilation
pub const DEFAULT_DILATION_KERNEL: u32 = 5;
/// Undo history depth
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
/// Classical fill radius for single-pass and the deep-model fallback
pub const DEFAULT_SINGLE_PASS_RADIUS: f32 = 5.0;
/// Radii chained by multi-pass inpainting
pub const DEFAULT_MULTI_PASS_RADII: [f32; 3] = [3.0, 7.0, 11.0];
/// Square working size of the deep inpainting model
pub const DEFAULT_DEEP_MODEL_RESOLUTION: u32 = 512;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference backend used to run the segmentation network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Pure Rust inference via tract
    #[default]
    Tract,
    /// ONNX Runtime
    Onnx,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

/// How the probability map is predicted from the source image
///
/// `Tiled` keeps full spatial precision at the cost of one network call per
/// window. `ResizeOnce` makes a single call at a fixed square resolution and
/// is much faster, but fine dust on large scans is blurred away by the
/// round trip through the fixed resolution. `window_size` and `stride` only
/// affect the tiled strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionStrategy {
    /// Overlapping windows averaged into one map
    #[default]
    Tiled,
    /// Whole image resized to a fixed square, one inference
    ResizeOnce,
}

/// Inpainting method selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InpaintMethod {
    /// One Telea pass at a fixed radius
    Telea,
    /// Chained Telea passes at increasing radii
    #[default]
    TeleaMultiPass,
    /// External deep model with Telea fallback
    Deep,
}

impl std::fmt::Display for InpaintMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Telea => write!(f, "telea"),
            Self::TeleaMultiPass => write!(f, "telea-multi-pass"),
            Self::Deep => write!(f, "deep"),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG
    Png,
    /// JPEG at the configured quality
    Jpeg,
    /// Lossless TIFF
    Tiff,
}

impl OutputFormat {
    /// Infer the output format from a file extension
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Infer the output format from a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical file extension
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tiff",
        }
    }
}

/// Patch inference and thresholding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// A pixel is dust iff its probability strictly exceeds this value
    pub threshold: f32,
    /// Edge of the square window fed to the network (tiled strategy)
    pub window_size: u32,
    /// Step between neighbouring windows (tiled strategy)
    pub stride: u32,
    /// Tiled or resize-once prediction
    pub strategy: PredictionStrategy,
    /// Square edge used by the resize-once strategy
    pub resize_resolution: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            stride: DEFAULT_STRIDE,
            strategy: PredictionStrategy::default(),
            resize_resolution: DEFAULT_RESIZE_RESOLUTION,
        }
    }
}

impl DetectionConfig {
    /// Validate detection parameters
    ///
    /// # Errors
    /// - Threshold outside `[0, 1)`
    /// - Zero window size or resize resolution
    /// - Stride of zero or larger than the window
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(DustRemovalError::config_value_error(
                "threshold",
                self.threshold,
                "0.0-1.0 (exclusive)",
                Some(DEFAULT_THRESHOLD),
            ));
        }
        if self.window_size == 0 {
            return Err(DustRemovalError::config_value_error(
                "window size",
                self.window_size,
                ">= 1",
                Some(DEFAULT_WINDOW_SIZE),
            ));
        }
        if self.stride == 0 || self.stride > self.window_size {
            return Err(DustRemovalError::config_value_error(
                "stride",
                self.stride,
                &format!("1-{}", self.window_size),
                Some(self.window_size / 2),
            ));
        }
        if self.resize_resolution == 0 {
            return Err(DustRemovalError::config_value_error(
                "resize resolution",
                self.resize_resolution,
                ">= 1",
                Some(DEFAULT_RESIZE_RESOLUTION),
            ));
        }
        Ok(())
    }
}

/// Interactive editing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingConfig {
    /// Brush radius in original-image pixels
    pub brush_radius: u32,
    /// Mask overlay opacity
    pub overlay_opacity: f32,
    /// Upper bound on the low-resolution scale factor
    pub low_res_fraction: f32,
    /// Longest side of the low-resolution working mask
    pub max_drawing_resolution: u32,
    /// Undo history depth
    pub history_capacity: usize,
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            brush_radius: 15,
            overlay_opacity: 0.6,
            low_res_fraction: 0.25,
            max_drawing_resolution: 1024,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl EditingConfig {
    /// Validate editing parameters
    ///
    /// # Errors
    /// - Brush radius outside `1-500`
    /// - Opacity outside `[0, 1]`
    /// - Low-res fraction outside `(0, 1]`
    /// - Zero drawing resolution or history capacity
    pub fn validate(&self) -> Result<()> {
        if !(1..=500).contains(&self.brush_radius) {
            return Err(DustRemovalError::config_value_error(
                "brush radius",
                self.brush_radius,
                "1-500",
                Some(15),
            ));
        }
        if !(0.0..=1.0).contains(&self.overlay_opacity) {
            return Err(DustRemovalError::config_value_error(
                "overlay opacity",
                self.overlay_opacity,
                "0.0-1.0",
                Some(0.6),
            ));
        }
        if !(self.low_res_fraction > 0.0 && self.low_res_fraction <= 1.0) {
            return Err(DustRemovalError::config_value_error(
                "low-res fraction",
                self.low_res_fraction,
                "(0.0, 1.0]",
                Some(0.25),
            ));
        }
        if self.max_drawing_resolution == 0 {
            return Err(DustRemovalError::config_value_error(
                "max drawing resolution",
                self.max_drawing_resolution,
                ">= 1",
                Some(1024),
            ));
        }
        if self.history_capacity == 0 {
            return Err(DustRemovalError::config_value_error(
                "history capacity",
                self.history_capacity,
                ">= 1",
                Some(DEFAULT_HISTORY_CAPACITY),
            ));
        }
        Ok(())
    }
}

/// Inpainting and mask post-processing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintingConfig {
    /// Strategy selection
    pub method: InpaintMethod,
    /// Radius of the single Telea pass (also the deep-model fallback)
    pub single_pass_radius: f32,
    /// Radii of the chained Telea passes
    pub multi_pass_radii: Vec<f32>,
    /// Structuring element size for dilation before inpainting
    pub dilation_kernel: u32,
    /// Optional ONNX inpainting model for the deep strategy
    pub deep_model: Option<PathBuf>,
    /// Square working size of the deep model
    pub deep_model_resolution: u32,
}

impl Default for InpaintingConfig {
    fn default() -> Self {
        Self {
            method: InpaintMethod::default(),
            single_pass_radius: DEFAULT_SINGLE_PASS_RADIUS,
            multi_pass_radii: DEFAULT_MULTI_PASS_RADII.to_vec(),
            dilation_kernel: DEFAULT_DILATION_KERNEL,
            deep_model: None,
            deep_model_resolution: DEFAULT_DEEP_MODEL_RESOLUTION,
        }
    }
}

impl InpaintingConfig {
    /// Validate inpainting parameters
    ///
    /// # Errors
    /// - Non-positive radius
    /// - Empty multi-pass radius list
    /// - Zero dilation kernel or deep model resolution
    pub fn validate(&self) -> Result<()> {
        if self.single_pass_radius <= 0.0 {
            return Err(DustRemovalError::config_value_error(
                "inpainting radius",
                self.single_pass_radius,
                "> 0",
                Some(DEFAULT_SINGLE_PASS_RADIUS),
            ));
        }
        if self.multi_pass_radii.is_empty() {
            return Err(DustRemovalError::invalid_config(
                "multi-pass inpainting needs at least one radius",
            ));
        }
        if let Some(radius) = self.multi_pass_radii.iter().find(|r| **r <= 0.0) {
            return Err(DustRemovalError::config_value_error(
                "multi-pass radius",
                *radius,
                "> 0",
                None,
            ));
        }
        if self.dilation_kernel == 0 {
            return Err(DustRemovalError::config_value_error(
                "dilation kernel",
                self.dilation_kernel,
                ">= 1",
                Some(DEFAULT_DILATION_KERNEL),
            ));
        }
        if self.deep_model_resolution == 0 {
            return Err(DustRemovalError::config_value_error(
                "deep model resolution",
                self.deep_model_resolution,
                ">= 1",
                Some(DEFAULT_DEEP_MODEL_RESOLUTION),
            ));
        }
        Ok(())
    }
}

/// Output file parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Explicit output format (`None` keeps the source format)
    pub format: Option<OutputFormat>,
    /// JPEG quality (0-100, only used for JPEG output)
    pub jpeg_quality: u8,
    /// Suffix appended to the source file stem
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: None,
            jpeg_quality: 95,
            suffix: "_dust_removal".to_string(),
        }
    }
}

/// Backend and model selection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Inference backend
    pub backend: BackendType,
    /// Execution provider (ONNX Runtime only)
    pub provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Explicit segmentation weights (`None` searches the model directories)
    pub model_path: Option<PathBuf>,
}

/// Complete configuration for a dust removal session or batch run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DustRemovalConfig {
    pub detection: DetectionConfig,
    pub editing: EditingConfig,
    pub inpainting: InpaintingConfig,
    pub output: OutputConfig,
    pub execution: ExecutionConfig,
}

impl DustRemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spotless_film::config::{DustRemovalConfig, PredictionStrategy};
    ///
    /// let config = DustRemovalConfig::builder()
    ///     .threshold(0.02)
    ///     .strategy(PredictionStrategy::ResizeOnce)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.detection.threshold, 0.02);
    /// ```
    #[must_use]
    pub fn builder() -> DustRemovalConfigBuilder {
        DustRemovalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or invalid values
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DustRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            DustRemovalError::invalid_config(format!(
                "Failed to parse '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration sections
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.editing.validate()?;
        self.inpainting.validate()?;
        if self.output.jpeg_quality > 100 {
            return Err(DustRemovalError::config_value_error(
                "JPEG quality",
                self.output.jpeg_quality,
                "0-100",
                Some(95),
            ));
        }
        Ok(())
    }
}

/// Builder for `DustRemovalConfig`
#[derive(Debug, Default)]
pub struct DustRemovalConfigBuilder {
    config: DustRemovalConfig,
}

impl DustRemovalConfigBuilder {
    /// Set detection threshold
    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.config.detection.threshold = threshold;
        self
    }

    /// Set tile edge
    #[must_use]
    pub fn window_size(mut self, window_size: u32) -> Self {
        self.config.detection.window_size = window_size;
        self
    }

    /// Set tile step
    #[must_use]
    pub fn stride(mut self, stride: u32) -> Self {
        self.config.detection.stride = stride;
        self
    }

    /// Set prediction strategy
    #[must_use]
    pub fn strategy(mut self, strategy: PredictionStrategy) -> Self {
        self.config.detection.strategy = strategy;
        self
    }

    /// Set brush radius in image pixels
    #[must_use]
    pub fn brush_radius(mut self, radius: u32) -> Self {
        self.config.editing.brush_radius = radius;
        self
    }

    /// Set overlay opacity
    #[must_use]
    pub fn overlay_opacity(mut self, opacity: f32) -> Self {
        self.config.editing.overlay_opacity = opacity;
        self
    }

    /// Set maximum low-resolution drawing size
    #[must_use]
    pub fn max_drawing_resolution(mut self, resolution: u32) -> Self {
        self.config.editing.max_drawing_resolution = resolution;
        self
    }

    /// Set inpainting method
    #[must_use]
    pub fn inpaint_method(mut self, method: InpaintMethod) -> Self {
        self.config.inpainting.method = method;
        self
    }

    /// Set dilation kernel size
    #[must_use]
    pub fn dilation_kernel(mut self, kernel: u32) -> Self {
        self.config.inpainting.dilation_kernel = kernel;
        self
    }

    /// Set deep inpainting model path
    #[must_use]
    pub fn deep_model<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.inpainting.deep_model = Some(path.into());
        self
    }

    /// Set explicit output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output.format = Some(format);
        self
    }

    /// Set JPEG quality
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.output.jpeg_quality = quality.min(100);
        self
    }

    /// Set inference backend
    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.execution.backend = backend;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution.provider = provider;
        self
    }

    /// Set segmentation weights path
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.execution.model_path = Some(path.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn build(self) -> Result<DustRemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DustRemovalConfig::default();
        assert_eq!(config.detection.threshold, 0.05);
        assert_eq!(config.detection.window_size, 1024);
        assert_eq!(config.detection.stride, 512);
        assert_eq!(config.editing.history_capacity, 20);
        assert_eq!(config.inpainting.dilation_kernel, 5);
        assert_eq!(config.output.jpeg_quality, 95);
        assert_eq!(config.output.suffix, "_dust_removal");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        let result = DustRemovalConfig::builder().window_size(256).stride(512).build();
        assert!(result.is_err());

        let result = DustRemovalConfig::builder().threshold(1.0).build();
        let message = result.unwrap_err().to_string();
        assert!(message.contains("threshold"));

        let config = DustRemovalConfig::builder()
            .window_size(256)
            .stride(128)
            .jpeg_quality(150)
            .build()
            .unwrap();
        assert_eq!(config.output.jpeg_quality, 100);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "detection": { "threshold": 0.01, "strategy": "resize-once" } }"#;
        let config: DustRemovalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.detection.threshold, 0.01);
        assert_eq!(config.detection.strategy, PredictionStrategy::ResizeOnce);
        assert_eq!(config.detection.window_size, 1024);
        assert_eq!(config.inpainting.method, InpaintMethod::TeleaMultiPass);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = DustRemovalConfig::builder()
            .inpaint_method(InpaintMethod::Deep)
            .dilation_kernel(7)
            .build()
            .unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = DustRemovalConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_output_format_from_extension() {
        assert_eq!(OutputFormat::from_extension("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_extension("tif"), Some(OutputFormat::Tiff));
        assert_eq!(OutputFormat::from_extension("bmp"), None);
        assert_eq!(
            OutputFormat::from_path(Path::new("scan.png")),
            Some(OutputFormat::Png)
        );
    }
}
