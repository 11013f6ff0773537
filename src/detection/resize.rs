//! Single-shot whole-image inference at a fixed square resolution

use super::preprocess::{normalize_gray, resize_probability, window_to_tensor};
use crate::error::{DustRemovalError, Result};
use crate::inference::{run_checked, SegmentationBackend};
use crate::types::ProbabilityMap;
use image::{imageops, GrayImage};
use ndarray::s;

/// Resize to `resolution`², run once, and resize the prediction back
///
/// Fast path: the network sees the whole frame, but fine specks smaller than
/// one working pixel are averaged away by the downscale.
///
/// # Errors
/// - Zero resolution or empty image
/// - Network failure
pub fn predict_resized(
    image: &GrayImage,
    backend: &mut dyn SegmentationBackend,
    resolution: u32,
) -> Result<ProbabilityMap> {
    let (width, height) = image.dimensions();
    if resolution == 0 || width == 0 || height == 0 {
        return Err(DustRemovalError::processing(format!(
            "Cannot resize {width}x{height} image to {resolution}x{resolution}"
        )));
    }

    log::debug!("Resizing {width}x{height} to {resolution}x{resolution} for single-shot detection");
    let working = if (width, height) == (resolution, resolution) {
        normalize_gray(image)
    } else {
        let resized = imageops::resize(image, resolution, resolution, imageops::FilterType::Triangle);
        normalize_gray(&resized)
    };

    let output = run_checked(backend, &window_to_tensor(working.view()))?;
    let prediction = output.slice(s![0, 0, .., ..]);
    ProbabilityMap::new(resize_probability(prediction, height, width)?)
}
