//! Engines that run the dust segmentation network
//!
//! Tract needs nothing beyond the weights file. ONNX Runtime can hand the
//! convolutions to CUDA or CoreML.

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
