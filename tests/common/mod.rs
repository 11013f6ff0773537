//! Shared fixtures for integration tests
//!
//! Integration tests cannot see the crate's `#[cfg(test)]` mocks, so this
//! module carries its own deterministic segmentation network.

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use instant::Duration;
use ndarray::Array4;
use spotless_film::{
    config::ExecutionConfig, models::ModelInfo, DustRemovalError, Result, SegmentationBackend,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Network stand-in: probability is `1 - intensity`, or a constant
#[derive(Debug, Clone)]
pub struct FakeUnet {
    constant: Option<f32>,
    initialized: bool,
    fail_inference: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeUnet {
    pub fn darkness() -> Self {
        Self {
            constant: None,
            initialized: false,
            fail_inference: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn constant(value: f32) -> Self {
        Self {
            constant: Some(value),
            ..Self::darkness()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_inference: true,
            ..Self::darkness()
        }
    }

    /// Already initialized, for calling detection functions directly
    pub fn ready(mut self) -> Self {
        self.initialized = true;
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl SegmentationBackend for FakeUnet {
    fn initialize(&mut self, _config: &ExecutionConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inference {
            return Err(DustRemovalError::inference("simulated device failure"));
        }
        Ok(match self.constant {
            Some(value) => Array4::from_elem(input.dim(), value),
            None => input.mapv(|v| 1.0 - v),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "fake-unet"
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "fake-unet".to_string(),
            path: PathBuf::from("fake.onnx"),
            size_bytes: 0,
        })
    }
}

/// Flat grey frame with square black specks at the given top-left corners
pub fn specked_frame(width: u32, height: u32, specks: &[(u32, u32)], speck_size: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
    for &(sx, sy) in specks {
        for y in sy..(sy + speck_size).min(height) {
            for x in sx..(sx + speck_size).min(width) {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    image
}

pub fn dynamic(image: RgbImage) -> DynamicImage {
    DynamicImage::ImageRgb8(image)
}
