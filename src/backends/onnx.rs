//! ONNX Runtime backend for the dust segmentation network
//!
//! Supports CPU, CUDA and `CoreML` execution providers. When the `tract`
//! feature is also enabled the weights are checked against the fixed U-Net
//! parameter table before a session is created.

use crate::config::{ExecutionConfig, ExecutionProvider};
use crate::error::{DustRemovalError, Result};
use crate::inference::SegmentationBackend;
use crate::models::{ModelInfo, ModelManager};
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend for running the segmentation network
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List execution providers with availability status
    ///
    /// Returns `(name, available, description)` tuples.
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        [
            ("CPU", true, "portable, always present"),
            ("CUDA", cuda_available(), "NVIDIA GPUs"),
            ("CoreML", coreml_available(), "Apple Neural Engine and GPU"),
        ]
        .into_iter()
        .map(|(name, available, note)| (name.to_string(), available, note.to_string()))
        .collect()
    }

    /// Create a backend with weights resolved at initialization
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            model_manager: None,
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
        let weights = self
            .model_manager
            .as_ref()
            .ok_or_else(|| DustRemovalError::internal("weights were not resolved"))?
            .load_model()?;

        #[cfg(feature = "tract")]
        {
            use tract_onnx::prelude::Framework;
            let proto = tract_onnx::onnx()
                .proto_model_for_read(&mut std::io::Cursor::new(&weights))
                .map_err(|e| DustRemovalError::load(format!("Failed to parse ONNX weights: {e}")))?;
            crate::backends::tract::validate_onnx_weights(&proto)?;
        }

        let mut session_builder = Session::builder()
            .map_err(|e| {
                DustRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                DustRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let accelerators = accelerators(config.provider);
        if accelerators.is_empty() {
            log::info!("🎯 Segmentation runs on the CPU provider");
        } else {
            session_builder = session_builder
                .with_execution_providers(accelerators)
                .map_err(|e| {
                    DustRemovalError::inference(format!("Cannot register {}: {e}", config.provider))
                })?;
        }

        let intra_threads = match config.intra_threads {
            0 => std::thread::available_parallelism().map_or(4, std::num::NonZero::get),
            n => n,
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| DustRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&weights)
            .map_err(|e| DustRemovalError::model(format!("Failed to create session: {e}")))?;

        self.session = Some(session);
        self.initialized = true;

        let elapsed = started.elapsed();
        log::info!(
            "📊 ONNX session ready in {:.0}ms ({intra_threads} threads)",
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(elapsed)
    }
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

/// Accelerated providers to register for `provider`, best first
///
/// An empty list means plain CPU. Requesting a provider the runtime was not
/// built with degrades to CPU with a warning.
fn accelerators(provider: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
    let cuda = || CUDAExecutionProvider::default().build();
    let coreml = || CoreMLExecutionProvider::default().with_subgraphs(true).build();

    match provider {
        ExecutionProvider::Cpu => Vec::new(),
        ExecutionProvider::Auto => {
            let mut found = Vec::new();
            if cuda_available() {
                log::info!("🚀 Using CUDA for segmentation");
                found.push(cuda());
            }
            if coreml_available() {
                log::info!("🍎 Using CoreML for segmentation");
                found.push(coreml());
            }
            found
        },
        ExecutionProvider::Cuda if cuda_available() => vec![cuda()],
        ExecutionProvider::CoreMl if coreml_available() => vec![coreml()],
        ExecutionProvider::Cuda | ExecutionProvider::CoreMl => {
            log::warn!("⚠️ {provider} is not available in this build, running on CPU");
            Vec::new()
        },
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationBackend for OnnxBackend {
    fn initialize(&mut self, config: &ExecutionConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DustRemovalError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        let input_value = Value::from_array(input.clone()).map_err(|e| {
            DustRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| DustRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| DustRemovalError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| DustRemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                DustRemovalError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let output_shape = output_tensor.shape().to_vec();
        let [batch, channels, height, width] = output_shape.as_slice() else {
            return Err(DustRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };
        let output = Array4::from_shape_vec(
            (*batch, *channels, *height, *width),
            output_tensor.view().to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| DustRemovalError::inference(format!("Failed to reshape output: {e}")))?;

        log::debug!(
            "ONNX inference {:?} in {:.2}ms",
            input.shape(),
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "onnx"
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| DustRemovalError::internal("Model manager not initialized"))?
            .get_info()
    }
}
