//! Inpainting Dispatcher
//!
//! Routes an image and its (dilated) dust mask to one of the interchangeable
//! fill strategies, then blends the fill back into the original with the mask
//! as alpha so untouched pixels stay bit-identical to the source.

pub mod blend;
pub mod deep;
pub mod telea;

pub use blend::blend;
pub use deep::DeepInpaintModel;
#[cfg(feature = "tract")]
pub use deep::TractLamaInpainter;
pub use telea::{inpaint_telea, inpaint_telea_multi_pass};

use crate::config::{InpaintMethod, InpaintingConfig, DEFAULT_MULTI_PASS_RADII};
use crate::error::{DustRemovalError, Result};
use crate::mask::BinaryMask;
use crate::types::ImageSize;
use image::RgbImage;
use std::sync::Arc;

/// Fill strategy
#[derive(Debug, Clone)]
pub enum InpaintStrategy {
    /// One Telea pass at `radius`
    ClassicalSingle { radius: f32 },
    /// Telea passes at increasing radii, each on the previous output
    ClassicalMulti { radii: Vec<f32> },
    /// Deep model; any failure or a missing model falls back to single-pass
    Deep {
        model: Option<Arc<dyn DeepInpaintModel>>,
        fallback_radius: f32,
    },
}

impl Default for InpaintStrategy {
    fn default() -> Self {
        Self::ClassicalMulti {
            radii: DEFAULT_MULTI_PASS_RADII.to_vec(),
        }
    }
}

impl InpaintStrategy {
    /// Build the strategy named by `config`
    ///
    /// `model` is only used for [`InpaintMethod::Deep`].
    #[must_use]
    pub fn from_config(config: &InpaintingConfig, model: Option<Arc<dyn DeepInpaintModel>>) -> Self {
        match config.method {
            InpaintMethod::Telea => Self::ClassicalSingle {
                radius: config.single_pass_radius,
            },
            InpaintMethod::TeleaMultiPass => Self::ClassicalMulti {
                radii: config.multi_pass_radii.clone(),
            },
            InpaintMethod::Deep => Self::Deep {
                model,
                fallback_radius: config.single_pass_radius,
            },
        }
    }

    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClassicalSingle { .. } => "telea",
            Self::ClassicalMulti { .. } => "telea-multi-pass",
            Self::Deep { .. } => "deep",
        }
    }

    /// Fill the "on" pixels of `mask`
    ///
    /// # Errors
    /// - Classical inpainting failed; deep-model failures never surface
    pub fn inpaint(&self, image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage> {
        match self {
            Self::ClassicalSingle { radius } => inpaint_telea(image, mask, *radius),
            Self::ClassicalMulti { radii } => inpaint_telea_multi_pass(image, mask, radii),
            Self::Deep {
                model,
                fallback_radius,
            } => {
                let Some(model) = model else {
                    log::warn!("⚠️ Deep inpainting model unavailable, using Telea (radius {fallback_radius})");
                    return inpaint_telea(image, mask, *fallback_radius);
                };
                match model.inpaint(image, mask) {
                    Ok(filled) => Ok(filled),
                    Err(e) => {
                        log::warn!(
                            "⚠️ {} inpainting failed ({e}), falling back to Telea (radius {fallback_radius})",
                            model.name()
                        );
                        inpaint_telea(image, mask, *fallback_radius)
                    },
                }
            },
        }
    }
}

/// Inpaint with `strategy` and blend the fill into `image` using `mask`
///
/// An all-off mask returns the input unchanged without running a strategy.
///
/// # Errors
/// - Image or mask is empty
/// - The classical strategy failed
pub fn inpaint_and_blend(image: &RgbImage, mask: &BinaryMask, strategy: &InpaintStrategy) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || mask.size().is_empty() {
        return Err(DustRemovalError::inpainting("Cannot inpaint an empty image"));
    }
    if mask.is_all_off() {
        log::debug!("Mask is empty, nothing to inpaint");
        return Ok(image.clone());
    }

    let working_mask = mask.resize_nearest(ImageSize::new(width, height));
    let filled = strategy.inpaint(image, &working_mask)?;
    Ok(blend(image, &filled, &working_mask))
}
