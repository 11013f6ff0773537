//! Mock segmentation networks for unit tests
//!
//! These implement [`SegmentationBackend`] without model files so tiling,
//! session and processor logic can be tested deterministically.

use crate::config::ExecutionConfig;
use crate::error::{DustRemovalError, Result};
use crate::inference::SegmentationBackend;
use crate::models::ModelInfo;
use instant::Duration;
use ndarray::Array4;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// What the mock network outputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Every pixel gets the same probability
    Constant(f32),
    /// Output equals input
    Identity,
    /// Probability is `1 - intensity`, so dark specks read as dust
    Darkness,
    /// Always returns an all-zero tensor of this `(height, width)`
    FixedOutput(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailPoint {
    Initialize,
    Infer,
}

#[derive(Debug, Clone)]
pub struct MockSegmentationBackend {
    behavior: MockBehavior,
    ready: bool,
    fail_at: Option<FailPoint>,
    /// Input shapes seen by `infer`, in call order
    seen_shapes: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl MockSegmentationBackend {
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ready: false,
            fail_at: None,
            seen_shapes: Arc::default(),
        }
    }

    #[must_use]
    pub fn constant(value: f32) -> Self {
        Self::new(MockBehavior::Constant(value))
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::new(MockBehavior::Identity)
    }

    #[must_use]
    pub fn fixed_output(height: usize, width: usize) -> Self {
        Self::new(MockBehavior::FixedOutput(height, width))
    }

    /// Weights that never load
    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            fail_at: Some(FailPoint::Initialize),
            ..Self::identity()
        }
    }

    /// Loads fine, then every forward pass errors
    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            fail_at: Some(FailPoint::Infer),
            ..Self::identity()
        }
    }

    #[must_use]
    pub fn infer_calls(&self) -> usize {
        self.seen_shapes.lock().map_or(0, |shapes| shapes.len())
    }
}

impl SegmentationBackend for MockSegmentationBackend {
    fn initialize(&mut self, _config: &ExecutionConfig) -> Result<Option<Duration>> {
        if self.fail_at == Some(FailPoint::Initialize) {
            return Err(DustRemovalError::model("mock weights are corrupt"));
        }
        if std::mem::replace(&mut self.ready, true) {
            return Ok(None);
        }
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if let Ok(mut shapes) = self.seen_shapes.lock() {
            shapes.push(input.shape().to_vec());
        }
        if !self.ready {
            return Err(DustRemovalError::internal("mock used before initialize"));
        }
        if self.fail_at == Some(FailPoint::Infer) {
            return Err(DustRemovalError::inference("mock device out of memory"));
        }
        Ok(match self.behavior {
            MockBehavior::Constant(value) => Array4::from_elem(input.dim(), value),
            MockBehavior::Identity => input.clone(),
            MockBehavior::Darkness => input.mapv(|v| 1.0 - v),
            MockBehavior::FixedOutput(height, width) => Array4::zeros((1, 1, height, width)),
        })
    }

    fn is_initialized(&self) -> bool {
        self.ready
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-unet".to_string(),
            path: PathBuf::from("mock.onnx"),
            size_bytes: 0,
        })
    }
}
