//! Segmentation network abstraction
//!
//! Backends take an `NCHW` tensor of shape `[1, 1, H, W]` with intensities in
//! `[0, 1]` and return per-pixel dust probabilities of the same shape.

use crate::config::ExecutionConfig;
use crate::error::{DustRemovalError, Result};
use crate::models::ModelInfo;
use instant::Duration;
use ndarray::Array4;

/// Trait for segmentation inference backends
pub trait SegmentationBackend: Send {
    /// Load weights and prepare the backend
    ///
    /// Returns the model load time on first initialization and `None` when
    /// the backend was already initialized.
    ///
    /// # Errors
    /// - Weights file unreadable
    /// - Weights do not match the fixed architecture
    fn initialize(&mut self, config: &ExecutionConfig) -> Result<Option<Duration>>;

    /// Run the network on one `[1, 1, H, W]` tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Device or runtime failure
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Loaded model metadata
    ///
    /// # Errors
    /// - Backend has no model
    fn model_info(&self) -> Result<ModelInfo>;
}

/// Run `backend` and check the output matches the input's spatial size
///
/// # Errors
/// - Backend failure, reported as an inference error
/// - Output of the wrong shape
pub fn run_checked(backend: &mut dyn SegmentationBackend, input: &Array4<f32>) -> Result<Array4<f32>> {
    let output = backend.infer(input).map_err(|e| match e {
        DustRemovalError::Inference(_) => e,
        other => DustRemovalError::inference(format!("{} backend failed: {other}", backend.name())),
    })?;

    let (_, _, height, width) = input.dim();
    let (batch, channels, out_height, out_width) = output.dim();
    if batch != 1 || channels != 1 || out_height != height || out_width != width {
        return Err(DustRemovalError::inference(format!(
            "Expected output shape [1, 1, {height}, {width}], got {:?}",
            output.shape()
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSegmentationBackend;

    #[test]
    fn test_run_checked_passes_matching_output() {
        let mut backend = MockSegmentationBackend::constant(0.25);
        backend.initialize(&ExecutionConfig::default()).unwrap();
        let input = Array4::zeros((1, 1, 8, 6));
        let output = run_checked(&mut backend, &input).unwrap();
        assert_eq!(output.dim(), (1, 1, 8, 6));
        assert!(output.iter().all(|v| (*v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn test_run_checked_rejects_wrong_shape() {
        let mut backend = MockSegmentationBackend::fixed_output(4, 4);
        backend.initialize(&ExecutionConfig::default()).unwrap();
        let err = run_checked(&mut backend, &Array4::zeros((1, 1, 8, 8))).unwrap_err();
        assert!(err.is_inference());
    }

    #[test]
    fn test_run_checked_wraps_backend_errors() {
        let mut backend = MockSegmentationBackend::new_failing_inference();
        backend.initialize(&ExecutionConfig::default()).unwrap();
        let err = run_checked(&mut backend, &Array4::zeros((1, 1, 2, 2))).unwrap_err();
        assert!(err.is_inference());
    }
}
