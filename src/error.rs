//! Error types for dust detection and removal operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for dust removal operations
pub type Result<T> = std::result::Result<T, DustRemovalError>;

/// Error taxonomy for the detection, editing and removal pipeline
///
/// Interaction problems (a pointer outside the image, a stroke without an
/// active mask) are deliberately absent: those operations report `false` or
/// `None` instead of failing.
#[derive(Error, Debug)]
pub enum DustRemovalError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Decoder or encoder rejected the pixels
    #[error("Image codec failure: {0}")]
    Image(#[from] image::ImageError),

    /// Bad path, corrupt input or missing weights file
    #[error("Cannot load: {0}")]
    Load(String),

    /// Weights do not match the fixed network architecture
    #[error("Segmentation model rejected: {0}")]
    Model(String),

    /// Segmentation network failed to execute
    #[error("Dust detection failed: {0}")]
    Inference(String),

    #[error("Inpainting failed: {0}")]
    Inpainting(String),

    /// An option outside its documented range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot write {0} output")]
    UnsupportedFormat(String),

    /// Pipeline precondition or processing failure
    #[error("Processing failed: {0}")]
    Processing(String),

    /// A task of the same kind is already running
    #[error("{0} already in progress")]
    TaskInProgress(&'static str),

    /// Broken invariant inside the crate, such as a poisoned lock
    #[error("Bug: {0}")]
    Internal(String),
}

impl DustRemovalError {
    pub fn load<S: Into<String>>(msg: S) -> Self {
        Self::Load(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn inpainting<S: Into<String>>(msg: S) -> Self {
        Self::Inpainting(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an I/O error, keeping its kind, with what was being done to which path
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        let message = format!("Failed to {operation} '{}': {error}", path.as_ref().display());
        Self::Io(std::io::Error::new(error.kind(), message))
    }

    /// Decode failure for a scan, naming the extension that was tried
    pub fn image_load_error<P: AsRef<Path>>(path: P, error: &image::ImageError) -> Self {
        let path = path.as_ref();
        let ext = path.extension().map_or_else(
            || "none".to_string(),
            |e| e.to_string_lossy().to_lowercase(),
        );
        Self::Load(format!(
            "{} is not a readable scan (extension: {ext}): {error}. Expected JPEG, PNG, TIFF or BMP",
            path.display()
        ))
    }

    /// Out-of-range option, optionally with the value we would suggest
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let hint = recommended.map_or_else(String::new, |r| format!(" Recommended: {r}"));
        Self::InvalidConfig(format!(
            "{parameter} = {value} is outside {valid_range}.{hint}"
        ))
    }

    /// Failure inside a named pipeline step
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let on = input_info.map_or_else(String::new, |info| format!(" on {info}"));
        Self::Processing(format!("{stage}{on}: {details}"))
    }

    /// Whether the error came from the segmentation network at run time
    #[must_use]
    pub fn is_inference(&self) -> bool {
        matches!(self, Self::Inference(_))
    }
}
