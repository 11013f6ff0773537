//! Morphological dilation of binary masks
//!
//! Detected dust edges are imprecise, so masks are grown by a small
//! elliptical structuring element before inpainting.

use super::codec::{BinaryMask, MASK_OFF, MASK_ON};
use crate::error::{DustRemovalError, Result};
use rayon::prelude::*;

const PARALLEL_PIXEL_THRESHOLD: usize = 256 * 256;

/// Elliptical structuring element inscribed in a `size x size` box
///
/// Row `i` spans columns `c - dx ..= c + dx` where
/// `dx = round(c * sqrt(1 - ((i - r) / r)^2))`, anchored at the centre
/// `(size / 2, size / 2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    size: u32,
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// Build an elliptical element
    ///
    /// # Errors
    /// - `size` is zero
    pub fn ellipse(size: u32) -> Result<Self> {
        if size == 0 {
            return Err(DustRemovalError::config_value_error(
                "structuring element size",
                size,
                ">= 1",
                Some(5),
            ));
        }
        let anchor = (size / 2) as i32;
        let r = f64::from(size / 2);
        let c = f64::from(size / 2);
        let inv_r2 = if r > 0.0 { 1.0 / (r * r) } else { 0.0 };

        let mut offsets = Vec::new();
        for i in 0..size as i32 {
            let dy = f64::from(i) - r;
            if dy.abs() > r {
                continue;
            }
            let dx = (c * ((r * r - dy * dy) * inv_r2).sqrt()).round() as i32;
            let start = (anchor - dx).max(0);
            let end = (anchor + dx + 1).min(size as i32);
            for j in start..end {
                offsets.push((j - anchor, i - anchor));
            }
        }
        Ok(Self { size, offsets })
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// `(dx, dy)` offsets relative to the anchor
    #[must_use]
    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }

    /// Whether the element contains offset `(dx, dy)`
    #[must_use]
    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        self.offsets.contains(&(dx, dy))
    }
}

/// Dilate `mask` once with an elliptical element of `kernel_size`
///
/// Pixels outside the image never contribute, so the result is always a
/// superset of the input.
///
/// # Errors
/// - `kernel_size` is zero
pub fn dilate(mask: &BinaryMask, kernel_size: u32) -> Result<BinaryMask> {
    let element = StructuringElement::ellipse(kernel_size)?;
    dilate_with(mask, &element)
}

/// Dilate `mask` once with an arbitrary structuring element
///
/// # Errors
/// - Internal buffer size mismatch
pub fn dilate_with(mask: &BinaryMask, element: &StructuringElement) -> Result<BinaryMask> {
    let size = mask.size();
    if size.is_empty() || mask.is_all_off() {
        return Ok(mask.clone());
    }

    let width = size.width as i64;
    let height = size.height as i64;
    let src = mask.as_raw();
    let offsets = element.offsets();
    let mut raw = vec![MASK_OFF; size.area()];

    // out(x, y) is on iff some on pixel lies at (x - dx, y - dy)
    let fill_row = |(y, row): (usize, &mut [u8])| {
        let y = y as i64;
        for (x, out) in row.iter_mut().enumerate() {
            let x = x as i64;
            let hit = offsets.iter().any(|&(dx, dy)| {
                let sx = x - i64::from(dx);
                let sy = y - i64::from(dy);
                sx >= 0
                    && sy >= 0
                    && sx < width
                    && sy < height
                    && src.get((sy * width + sx) as usize) == Some(&MASK_ON)
            });
            *out = if hit { MASK_ON } else { MASK_OFF };
        }
    };

    let row_len = size.width as usize;
    if size.area() >= PARALLEL_PIXEL_THRESHOLD {
        raw.par_chunks_mut(row_len).enumerate().for_each(fill_row);
    } else {
        raw.chunks_mut(row_len).enumerate().for_each(fill_row);
    }

    BinaryMask::from_binary_raw(size.width, size.height, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipse_5x5_shape() {
        let element = StructuringElement::ellipse(5).unwrap();
        // top and bottom rows hold only the centre column
        assert!(element.contains(0, -2));
        assert!(!element.contains(-1, -2));
        assert!(element.contains(0, 2));
        // middle rows are full width
        assert!(element.contains(-2, -1));
        assert!(element.contains(2, 0));
        assert!(element.contains(-2, 1));
        assert_eq!(element.offsets().len(), 17);
    }

    #[test]
    fn test_ellipse_size_one_is_identity() {
        let element = StructuringElement::ellipse(1).unwrap();
        assert_eq!(element.offsets(), &[(0, 0)]);

        let mut mask = BinaryMask::new(6, 6);
        mask.set(2, 3, true);
        assert_eq!(dilate(&mask, 1).unwrap(), mask);
    }

    #[test]
    fn test_zero_kernel_rejected() {
        assert!(dilate(&BinaryMask::new(4, 4), 0).is_err());
    }

    #[test]
    fn test_single_pixel_grows_to_element() {
        let mut mask = BinaryMask::new(11, 11);
        mask.set(5, 5, true);
        let grown = dilate(&mask, 5).unwrap();
        assert_eq!(grown.count_on(), 17);
        assert!(grown.is_on(5, 3));
        assert!(!grown.is_on(4, 3));
        assert!(grown.is_on(3, 4));
    }

    #[test]
    fn test_dilation_is_inflationary() {
        let mut mask = BinaryMask::new(40, 30);
        for (x, y) in [(0, 0), (39, 29), (10, 10), (11, 10), (25, 5)] {
            mask.set(x, y, true);
        }
        for kernel in [1, 2, 3, 5, 9] {
            let grown = dilate(&mask, kernel).unwrap();
            assert!(mask.is_subset_of(&grown), "kernel {kernel}");
        }
    }

    #[test]
    fn test_all_off_mask_stays_off() {
        let mask = BinaryMask::new(1024, 1024);
        assert!(dilate(&mask, 5).unwrap().is_all_off());
    }

    #[test]
    fn test_repeated_dilation_compounds() {
        let mut mask = BinaryMask::new(21, 21);
        mask.set(10, 10, true);
        let once = dilate(&mask, 3).unwrap();
        let twice = dilate(&once, 3).unwrap();
        assert!(once.is_subset_of(&twice));
        assert!(twice.count_on() > once.count_on());
    }
}
