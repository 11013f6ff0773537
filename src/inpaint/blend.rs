//! Mask-alpha recombination of original and inpainted images

use crate::mask::BinaryMask;
use crate::types::ImageSize;
use image::{imageops, RgbImage};
use rayon::prelude::*;

/// `original * (1 - alpha) + inpainted * alpha` per channel
///
/// Alpha is the mask normalised to `[0, 1]`. A mask of a different size is
/// resized nearest-neighbour and a differently sized inpainted image is
/// resampled with Lanczos3 before blending, so the output always has the
/// original's dimensions.
#[must_use]
pub fn blend(original: &RgbImage, inpainted: &RgbImage, mask: &BinaryMask) -> RgbImage {
    let (width, height) = original.dimensions();
    let size = ImageSize::new(width, height);

    let resized_mask;
    let mask = if mask.size() == size {
        mask
    } else {
        log::debug!("Resizing blend mask {} -> {size}", mask.size());
        resized_mask = mask.resize_nearest(size);
        &resized_mask
    };

    let resized_inpainted;
    let inpainted = if inpainted.dimensions() == (width, height) {
        inpainted
    } else {
        resized_inpainted = imageops::resize(inpainted, width, height, imageops::FilterType::Lanczos3);
        &resized_inpainted
    };

    let mut output = original.clone();
    let alpha = mask.as_raw();
    output
        .par_chunks_mut(3)
        .zip(inpainted.par_chunks(3))
        .zip(alpha.par_iter())
        .for_each(|((out, fill), &a)| {
            let a = f32::from(a) / 255.0;
            for (channel, value) in out.iter_mut().enumerate() {
                let blended = f32::from(*value) * (1.0 - a) + f32::from(fill[channel]) * a;
                *value = blended.round().clamp(0.0, 255.0) as u8;
            }
        });
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_off_pixels_keep_original() {
        let original = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let inpainted = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        let mut mask = BinaryMask::new(4, 4);
        mask.set(1, 1, true);

        let result = blend(&original, &inpainted, &mask);
        assert_eq!(*result.get_pixel(1, 1), Rgb([200, 200, 200]));
        assert_eq!(*result.get_pixel(0, 0), Rgb([10, 20, 30]));
        assert_eq!(*result.get_pixel(3, 3), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_mismatched_mask_is_resized_nearest() {
        let original = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let inpainted = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
        let mut mask = BinaryMask::new(2, 2);
        mask.set(0, 0, true);

        let result = blend(&original, &inpainted, &mask);
        assert_eq!(*result.get_pixel(3, 3), Rgb([255, 255, 255]));
        assert_eq!(*result.get_pixel(4, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_mismatched_inpainted_is_resampled() {
        let original = RgbImage::from_pixel(6, 6, Rgb([0, 0, 0]));
        let inpainted = RgbImage::from_pixel(3, 3, Rgb([100, 100, 100]));
        let mask = BinaryMask::from_gray(&image::GrayImage::from_pixel(6, 6, image::Luma([255])));
        let result = blend(&original, &inpainted, &mask);
        assert_eq!(result.dimensions(), (6, 6));
        assert!(result.pixels().all(|p| p.0[0].abs_diff(100) <= 1));
    }
}
