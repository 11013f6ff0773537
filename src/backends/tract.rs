//! Tract backend for the dust segmentation network
//!
//! Pure Rust inference with no native dependencies. The ONNX graph is parsed
//! once, its initializers are checked against the fixed U-Net parameter
//! table, and an optimized plan is compiled lazily for every input size the
//! detector asks for (one per window size in practice).

use crate::config::ExecutionConfig;
use crate::error::{DustRemovalError, Result};
use crate::inference::SegmentationBackend;
use crate::models::{self, ModelInfo, ModelManager};
use instant::{Duration, Instant};
use ndarray::Array4;
use std::collections::HashMap;
use tract_onnx::pb::ModelProto;
use tract_onnx::prelude::*;

/// Optimized, runnable tract graph
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Compiled plans kept per input size
const MAX_CACHED_PLANS: usize = 4;

/// Check ONNX initializers against the U-Net parameter table
///
/// # Errors
/// - Graph missing
/// - Missing or misshapen parameters
pub fn validate_onnx_weights(proto: &ModelProto) -> Result<()> {
    let graph = proto
        .graph
        .as_ref()
        .ok_or_else(|| DustRemovalError::model("ONNX file contains no graph"))?;
    models::validate_parameters(
        graph
            .initializer
            .iter()
            .map(|tensor| (tensor.name.as_str(), tensor.dims.as_slice())),
    )
}

/// Tract backend for running the segmentation network
#[derive(Debug)]
pub struct TractBackend {
    model_manager: Option<ModelManager>,
    model: Option<InferenceModel>,
    plans: HashMap<(usize, usize), TractModel>,
    initialized: bool,
}

impl TractBackend {
    /// Create a backend with weights resolved at initialization
    #[must_use]
    pub fn new() -> Self {
        Self {
            model_manager: None,
            model: None,
            plans: HashMap::new(),
            initialized: false,
        }
    }

    /// Create a backend for a known weights file
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model_manager: Some(model_manager),
            ..Self::new()
        }
    }

    fn load_model(&mut self, config: &ExecutionConfig) -> Result<Duration> {
        let started = Instant::now();

        if self.model_manager.is_none() {
            self.model_manager = Some(ModelManager::resolve(config.model_path.as_deref())?);
        }
        let manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| DustRemovalError::internal("weights were not resolved"))?;
        let info = manager.get_info()?;
        let weights = manager.load_model()?;

        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!(
            "🧠 Loading {} into tract ({size_mb:.1} MB, {})",
            info.name,
            info.path.display()
        );

        let proto = onnx()
            .proto_model_for_read(&mut std::io::Cursor::new(weights))
            .map_err(|e| DustRemovalError::load(format!("Failed to parse ONNX weights: {e}")))?;
        validate_onnx_weights(&proto)?;

        let model = onnx()
            .model_for_proto_model(&proto)
            .map_err(|e| DustRemovalError::model(format!("Failed to load ONNX model: {e}")))?;

        self.model = Some(model);
        self.plans.clear();
        self.initialized = true;

        let elapsed = started.elapsed();
        log::info!(
            "✅ Segmentation weights checked and loaded in {:.0}ms",
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(elapsed)
    }

    /// Optimized plan for a `[1, 1, height, width]` input
    fn plan_for(&mut self, height: usize, width: usize) -> Result<&TractModel> {
        if !self.plans.contains_key(&(height, width)) {
            let model = self
                .model
                .as_ref()
                .ok_or_else(|| DustRemovalError::inference("Tract model not initialized"))?;

            log::debug!("Compiling Tract plan for {width}x{height} input");
            let compile_start = Instant::now();
            let plan = model
                .clone()
                .with_input_fact(0, f32::fact([1, 1, height, width]).into())
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| {
                    DustRemovalError::inference(format!(
                        "Failed to compile model for {width}x{height}: {e}"
                    ))
                })?;
            log::debug!(
                "  - Plan ready in {:.2}ms",
                compile_start.elapsed().as_secs_f64() * 1000.0
            );

            if self.plans.len() >= MAX_CACHED_PLANS {
                self.plans.clear();
            }
            self.plans.insert((height, width), plan);
        }
        self.plans
            .get(&(height, width))
            .ok_or_else(|| DustRemovalError::internal("Compiled plan missing from cache"))
    }
}

impl Default for TractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationBackend for TractBackend {
    fn initialize(&mut self, config: &ExecutionConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(DustRemovalError::inference("Tract model not initialized"));
        }
        let (_, _, height, width) = input.dim();
        let inference_start = Instant::now();

        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| DustRemovalError::inference("Input tensor is not contiguous"))?;
        let input_tensor = Tensor::from_shape(&[1, 1, height, width], data).map_err(|e| {
            DustRemovalError::inference(format!("Failed to build input tensor: {e}"))
        })?;

        let plan = self.plan_for(height, width)?;
        let outputs = plan
            .run(tvec![input_tensor.into()])
            .map_err(|e| DustRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| DustRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let shape = output_tensor.shape();
        let [batch, channels, out_height, out_width] = shape else {
            return Err(DustRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };
        let values = output_tensor.as_slice::<f32>().map_err(|e| {
            DustRemovalError::inference(format!("Failed to read output tensor: {e}"))
        })?;
        let output = Array4::from_shape_vec(
            (*batch, *channels, *out_height, *out_width),
            values.to_vec(),
        )
        .map_err(|e| DustRemovalError::inference(format!("Failed to reshape output: {e}")))?;

        log::debug!(
            "Tract inference {width}x{height} in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "tract"
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| DustRemovalError::internal("Model manager not initialized"))?
            .get_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tract_backend_creation() {
        let backend = TractBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.name(), "tract");
        assert!(backend.model_info().is_err());
    }

    #[test]
    fn test_uninitialized_inference_fails() {
        let mut backend = TractBackend::new();
        let err = backend.infer(&Array4::zeros((1, 1, 4, 4))).unwrap_err();
        assert!(err.is_inference());
    }

    #[test]
    fn test_invalid_weights_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        let manager = ModelManager::from_path(&path).unwrap();
        let mut backend = TractBackend::with_model_manager(manager);
        let err = backend.initialize(&ExecutionConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            DustRemovalError::Load(_) | DustRemovalError::Model(_)
        ));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_graph_without_parameters_rejected() {
        let proto = ModelProto {
            graph: Some(Default::default()),
            ..Default::default()
        };
        let err = validate_onnx_weights(&proto).unwrap_err();
        assert!(err.to_string().contains("missing 'enc1.0.weight'"));
    }
}
