//! Patch Inference Engine
//!
//! Turns a grayscale scan into a per-pixel dust probability map, either by
//! sliding a fixed-size window over the reflected-padded image and averaging
//! overlapping predictions ([`PredictionStrategy::Tiled`]) or by running the
//! network once on a resized copy ([`PredictionStrategy::ResizeOnce`]).

pub mod preprocess;
pub mod resize;
pub mod tiling;

pub use preprocess::{normalize_gray, resize_probability, window_to_tensor};
pub use resize::predict_resized;
pub use tiling::{padded_length, predict_tiled, reflect_pad, window_origins};

use crate::config::{DetectionConfig, PredictionStrategy};
use crate::error::{DustRemovalError, Result};
use crate::inference::SegmentationBackend;
use crate::types::ProbabilityMap;
use image::GrayImage;
use tracing::instrument;

/// Sub-range of overall pipeline progress that detection reports into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSpan {
    pub start: f32,
    pub end: f32,
}

impl ProgressSpan {
    #[must_use]
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Overall progress after `done` of `total` units
    #[must_use]
    pub fn at(&self, done: usize, total: usize) -> f32 {
        if total == 0 {
            return self.end;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = (done.min(total) as f32) / (total as f32);
        self.start + (self.end - self.start) * fraction
    }
}

impl Default for ProgressSpan {
    fn default() -> Self {
        Self::new(20.0, 60.0)
    }
}

/// Predict the dust probability map for `image`
///
/// `progress` receives overall percentages inside `span`. With
/// [`PredictionStrategy::ResizeOnce`] the window and stride settings are not
/// used.
///
/// # Errors
/// - Backend not initialized
/// - Invalid window or stride
/// - Network failure; no partial map is returned
#[instrument(skip_all, fields(width = image.width(), height = image.height(), strategy = ?config.strategy))]
pub fn detect(
    image: &GrayImage,
    backend: &mut dyn SegmentationBackend,
    config: &DetectionConfig,
    span: ProgressSpan,
    progress: &mut dyn FnMut(f32),
) -> Result<ProbabilityMap> {
    if !backend.is_initialized() {
        return Err(DustRemovalError::inference(format!(
            "{} backend used before initialization",
            backend.name()
        )));
    }

    progress(span.start);
    let map = match config.strategy {
        PredictionStrategy::Tiled => {
            let normalized = normalize_gray(image);
            predict_tiled(
                &normalized,
                backend,
                config.window_size as usize,
                config.stride as usize,
                &mut |done, total| progress(span.at(done, total)),
            )?
        },
        PredictionStrategy::ResizeOnce => predict_resized(image, backend, config.resize_resolution)?,
    };
    progress(span.end);

    log::debug!(
        "Detection produced {} map, peak probability {:.3}",
        map.size(),
        map.max_value()
    );
    Ok(map)
}
