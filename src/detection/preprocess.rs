//! Grayscale normalisation, tensor packing and probability-map resampling

use crate::error::{DustRemovalError, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{Array2, Array4, ArrayView2};

/// Intensities of `image` scaled to `[0, 1]`, indexed `[row, column]`
#[must_use]
pub fn normalize_gray(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        f32::from(image.get_pixel(x as u32, y as u32).0[0]) / 255.0
    })
}

/// Pack a 2D window into a `[1, 1, H, W]` network input
#[must_use]
pub fn window_to_tensor(window: ArrayView2<'_, f32>) -> Array4<f32> {
    let (height, width) = window.dim();
    let mut tensor = Array4::zeros((1, 1, height, width));
    tensor
        .slice_mut(ndarray::s![0, 0, .., ..])
        .assign(&window);
    tensor
}

/// Resample a probability map to `out_height` x `out_width`
///
/// Goes through `imageops::resize` with the triangle filter, which is bilinear
/// when upscaling. Values are kept in `[0, 1]`.
///
/// # Errors
/// - Empty source map
pub fn resize_probability(
    map: ArrayView2<'_, f32>,
    out_height: u32,
    out_width: u32,
) -> Result<Array2<f32>> {
    let (height, width) = map.dim();
    let as_dim = |len: usize| u32::try_from(len).ok().filter(|&v| v > 0);
    let (Some(src_width), Some(src_height)) = (as_dim(width), as_dim(height)) else {
        return Err(DustRemovalError::processing(format!(
            "Cannot resample an empty {width}x{height} prediction"
        )));
    };

    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(src_width, src_height, map.iter().copied().collect())
            .ok_or_else(|| DustRemovalError::internal("prediction buffer size mismatch"))?;
    let resized = imageops::resize(&buffer, out_width, out_height, FilterType::Triangle);

    Array2::from_shape_vec((out_height as usize, out_width as usize), resized.into_raw())
        .map(|restored| restored.mapv(|p| p.clamp(0.0, 1.0)))
        .map_err(|e| DustRemovalError::internal(format!("resampled prediction shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_gray_range() {
        let image = GrayImage::from_raw(3, 1, vec![0, 51, 255]).unwrap();
        let normalized = normalize_gray(&image);
        assert_eq!(normalized.dim(), (1, 3));
        assert_abs_diff_eq!(normalized[[0, 1]], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(normalized[[0, 2]], 1.0);
    }

    #[test]
    fn test_window_to_tensor_layout() {
        let window = Array2::from_shape_fn((2, 3), |(y, x)| (y * 3 + x) as f32);
        let tensor = window_to_tensor(window.view());
        assert_eq!(tensor.dim(), (1, 1, 2, 3));
        assert_abs_diff_eq!(tensor[[0, 0, 1, 2]], 5.0);
    }

    #[test]
    fn test_resampled_constant_map_stays_constant() {
        let map = Array2::from_elem((4, 4), 0.3_f32);
        let resized = resize_probability(map.view(), 9, 7).unwrap();
        assert_eq!(resized.dim(), (9, 7));
        assert!(resized.iter().all(|v| (*v - 0.3).abs() < 1e-5));
    }

    #[test]
    fn test_upscaled_ramp_is_smooth_and_monotone() {
        let map = Array2::from_shape_vec((1, 2), vec![0.0_f32, 1.0]).unwrap();
        let resized = resize_probability(map.view(), 1, 8).unwrap();
        let row: Vec<f32> = resized.iter().copied().collect();
        assert!(row.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(row.iter().any(|v| *v > 0.05 && *v < 0.95));
        assert!(row.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_empty_map_is_rejected() {
        let map = Array2::<f32>::zeros((0, 3));
        assert!(resize_probability(map.view(), 4, 4).is_err());
    }
}
