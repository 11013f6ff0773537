//! Deep generative inpainting models
//!
//! A model receives the RGB image and the binary mask and returns a filled
//! image. Failures are reported as errors here; the dispatcher decides to
//! fall back.

use crate::error::Result;
use crate::mask::BinaryMask;
use image::RgbImage;

/// Pretrained image + mask -> image model
pub trait DeepInpaintModel: Send + Sync + std::fmt::Debug {
    /// Fill the "on" pixels of `mask`
    ///
    /// # Errors
    /// - Model unavailable or runtime failure
    fn inpaint(&self, image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage>;

    /// Short model name for logs
    fn name(&self) -> &str;
}

#[cfg(feature = "tract")]
pub use self::lama::TractLamaInpainter;

#[cfg(feature = "tract")]
mod lama {
    use super::DeepInpaintModel;
    use crate::error::{DustRemovalError, Result};
    use crate::mask::BinaryMask;
    use crate::types::ImageSize;
    use image::{imageops, RgbImage};
    use instant::Instant;
    use std::path::{Path, PathBuf};
    use tract_onnx::prelude::*;

    type LamaPlan = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

    /// LaMa-style ONNX model run through tract at a fixed square size
    ///
    /// Inputs are `image` `[1, 3, S, S]` in `[0, 1]` and `mask`
    /// `[1, 1, S, S]` in `{0, 1}`; the output is `[1, 3, S, S]` in either
    /// `[0, 1]` or `[0, 255]`.
    #[derive(Debug)]
    pub struct TractLamaInpainter {
        path: PathBuf,
        resolution: u32,
        plan: LamaPlan,
    }

    impl TractLamaInpainter {
        /// Load and compile the model for `resolution`² inputs
        ///
        /// # Errors
        /// - File missing or not a loadable ONNX graph
        pub fn load<P: AsRef<Path>>(path: P, resolution: u32) -> Result<Self> {
            let path = path.as_ref();
            if !path.exists() {
                return Err(DustRemovalError::load(format!(
                    "Inpainting model not found: {}",
                    path.display()
                )));
            }
            let side = resolution as usize;
            let start = Instant::now();
            let plan = onnx()
                .model_for_path(path)
                .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, side, side]).into()))
                .and_then(|m| m.with_input_fact(1, f32::fact([1, 1, side, side]).into()))
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| {
                    DustRemovalError::model(format!(
                        "Failed to load inpainting model {}: {e}",
                        path.display()
                    ))
                })?;
            log::info!(
                "🎨 Deep inpainting model loaded in {:.0}ms ({})",
                start.elapsed().as_secs_f64() * 1000.0,
                path.display()
            );
            Ok(Self {
                path: path.to_path_buf(),
                resolution,
                plan,
            })
        }

        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl DeepInpaintModel for TractLamaInpainter {
        fn inpaint(&self, image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage> {
            let (width, height) = image.dimensions();
            let side = self.resolution;
            let working = imageops::resize(image, side, side, imageops::FilterType::Triangle);
            let working_mask = mask.resize_nearest(ImageSize::new(side, side));

            let plane = (side * side) as usize;
            let mut image_data = vec![0.0_f32; 3 * plane];
            for (i, pixel) in working.pixels().enumerate() {
                for channel in 0..3 {
                    image_data[channel * plane + i] = f32::from(pixel.0[channel]) / 255.0;
                }
            }
            let mask_data: Vec<f32> = working_mask
                .as_raw()
                .iter()
                .map(|&v| if v > 0 { 1.0 } else { 0.0 })
                .collect();

            let side = side as usize;
            let to_tensor = |shape: &[usize], data: &[f32]| {
                Tensor::from_shape(shape, data).map_err(|e| {
                    DustRemovalError::inpainting(format!("Failed to build input tensor: {e}"))
                })
            };
            let image_tensor = to_tensor(&[1, 3, side, side], &image_data)?;
            let mask_tensor = to_tensor(&[1, 1, side, side], &mask_data)?;

            let outputs = self
                .plan
                .run(tvec![image_tensor.into(), mask_tensor.into()])
                .map_err(|e| DustRemovalError::inpainting(format!("Deep inpainting failed: {e}")))?;
            let output = outputs
                .into_iter()
                .next()
                .ok_or_else(|| DustRemovalError::inpainting("Deep model produced no output"))?
                .into_arc_tensor();
            if output.shape() != [1, 3, side, side] {
                return Err(DustRemovalError::inpainting(format!(
                    "Unexpected deep model output shape {:?}",
                    output.shape()
                )));
            }
            let values = output.as_slice::<f32>().map_err(|e| {
                DustRemovalError::inpainting(format!("Failed to read deep model output: {e}"))
            })?;

            let scale = if values.iter().copied().fold(0.0, f32::max) > 1.5 {
                1.0
            } else {
                255.0
            };
            let filled = RgbImage::from_fn(side as u32, side as u32, |x, y| {
                let i = y as usize * side + x as usize;
                let channel = |c: usize| {
                    (values.get(c * plane + i).copied().unwrap_or(0.0) * scale)
                        .round()
                        .clamp(0.0, 255.0) as u8
                };
                image::Rgb([channel(0), channel(1), channel(2)])
            });

            Ok(imageops::resize(&filled, width, height, imageops::FilterType::Lanczos3))
        }

        fn name(&self) -> &str {
            "lama"
        }
    }

}
