//! Core value types shared across the pipeline

use crate::error::{DustRemovalError, Result};
use crate::mask::BinaryMask;
use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pixel dimensions of an image or mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    #[must_use]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-pixel dust likelihood in `[0, 1]`, indexed `[row, column]`
///
/// Produced once per detection run and never mutated afterwards; every
/// threshold change derives a fresh mask from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    data: Array2<f32>,
}

impl ProbabilityMap {
    /// Wrap a `[height, width]` array of probabilities
    ///
    /// # Errors
    /// - Empty array
    pub fn new(data: Array2<f32>) -> Result<Self> {
        if data.is_empty() {
            return Err(DustRemovalError::processing(
                "Probability map must not be empty",
            ));
        }
        Ok(Self { data })
    }

    /// Map of the given size filled with one value
    #[must_use]
    pub fn filled(size: ImageSize, value: f32) -> Self {
        Self {
            data: Array2::from_elem((size.height as usize, size.width as usize), value),
        }
    }

    #[must_use]
    pub fn size(&self) -> ImageSize {
        let (rows, cols) = self.data.dim();
        ImageSize::new(cols as u32, rows as u32)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.size().width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.size().height
    }

    /// Probability at pixel `(x, y)`
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.data.get((y as usize, x as usize)).copied()
    }

    #[must_use]
    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    #[must_use]
    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    /// Largest probability in the map
    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }
}

/// Timing breakdown for one processing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first run only)
    pub model_load_ms: u64,
    /// Image decode time
    pub image_decode_ms: u64,
    /// Patch inference time
    pub detection_ms: u64,
    /// Thresholding time
    pub thresholding_ms: u64,
    /// Dilation time
    pub dilation_ms: u64,
    /// Inpainting time
    pub inpainting_ms: u64,
    /// Blending time
    pub blending_ms: u64,
    /// Output encode time
    pub image_encode_ms: Option<u64>,
    /// Total end-to-end time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Human-readable breakdown for logs
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "detect {}ms, threshold {}ms, dilate {}ms, inpaint {}ms, blend {}ms",
            self.detection_ms,
            self.thresholding_ms,
            self.dilation_ms,
            self.inpainting_ms,
            self.blending_ms
        );
        if let Some(encode) = self.image_encode_ms {
            summary.push_str(&format!(", encode {encode}ms"));
        }
        summary.push_str(&format!(" (total {}ms)", self.total_ms));
        summary
    }
}

/// Output of a detection run
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Raw network output, kept for re-thresholding
    pub probability: ProbabilityMap,
    /// Mask at the threshold used for this run
    pub mask: BinaryMask,
    /// Wall-clock inference time
    pub elapsed: Duration,
}

impl DetectionResult {
    /// Fraction of pixels flagged as dust
    #[must_use]
    pub fn coverage(&self) -> f32 {
        self.mask.coverage()
    }
}

/// Output of a removal run
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Blended result image
    pub image: RgbImage,
    /// Mask actually used for inpainting (after dilation)
    pub dilated_mask: BinaryMask,
    /// Timing breakdown
    pub timings: ProcessingTimings,
}
