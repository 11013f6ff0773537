//! Binary mask representation, thresholding and nearest-neighbour resampling

use crate::error::{DustRemovalError, Result};
use crate::types::{ImageSize, ProbabilityMap};
use image::{GrayImage, Luma};
use rayon::prelude::*;

/// Value of a dust pixel
pub const MASK_ON: u8 = 255;
/// Value of a clean pixel
pub const MASK_OFF: u8 = 0;

/// Images above this many pixels are processed row-parallel
const PARALLEL_PIXEL_THRESHOLD: usize = 256 * 256;

/// Single-channel mask whose pixels are always exactly 0 or 255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    pixels: GrayImage,
}

impl BinaryMask {
    /// All-off mask
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
    }

    /// All-off mask of the given size
    #[must_use]
    pub fn empty(size: ImageSize) -> Self {
        Self::new(size.width, size.height)
    }

    /// Build from an arbitrary grayscale image; values of 128 and above are on
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        let mut pixels = gray.clone();
        for value in pixels.iter_mut() {
            *value = if *value >= 128 { MASK_ON } else { MASK_OFF };
        }
        Self { pixels }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width(), self.height())
    }

    /// Whether `(x, y)` is a dust pixel; out-of-range coordinates are off
    #[must_use]
    pub fn is_on(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.pixels.get_pixel(x, y).0[0] == MASK_ON
    }

    /// Set one pixel; out-of-range coordinates are ignored
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        if x < self.width() && y < self.height() {
            self.pixels
                .put_pixel(x, y, Luma([if on { MASK_ON } else { MASK_OFF }]));
        }
    }

    /// Number of dust pixels
    #[must_use]
    pub fn count_on(&self) -> usize {
        self.pixels.iter().filter(|v| **v == MASK_ON).count()
    }

    #[must_use]
    pub fn is_all_off(&self) -> bool {
        self.pixels.iter().all(|v| *v == MASK_OFF)
    }

    /// Fraction of pixels flagged as dust
    #[must_use]
    pub fn coverage(&self) -> f32 {
        let area = self.size().area();
        if area == 0 {
            return 0.0;
        }
        self.count_on() as f32 / area as f32
    }

    /// Whether every on pixel of `self` is also on in `other`
    #[must_use]
    pub fn is_subset_of(&self, other: &BinaryMask) -> bool {
        self.size() == other.size()
            && self
                .pixels
                .iter()
                .zip(other.pixels.iter())
                .all(|(a, b)| *a == MASK_OFF || *b == MASK_ON)
    }

    /// Borrow the underlying 0/255 image
    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.pixels
    }

    /// Raw row-major 0/255 buffer
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut *self.pixels
    }

    /// Wrap a buffer already known to hold only 0 and 255
    pub(crate) fn from_binary_raw(width: u32, height: u32, raw: Vec<u8>) -> Result<Self> {
        GrayImage::from_raw(width, height, raw)
            .map(|pixels| Self { pixels })
            .ok_or_else(|| {
                DustRemovalError::internal(format!(
                    "Mask buffer does not match {width}x{height}"
                ))
            })
    }

    /// Resample to `target` with nearest-neighbour semantics
    ///
    /// Destination pixel `x` samples source column `floor((x + 0.5) * src / dst)`,
    /// so values stay binary and an integer upscale followed by the matching
    /// downscale reproduces the original mask exactly.
    #[must_use]
    pub fn resize_nearest(&self, target: ImageSize) -> BinaryMask {
        if target == self.size() {
            return self.clone();
        }
        if target.is_empty() || self.size().is_empty() {
            return Self::empty(target);
        }

        let x_map = nearest_index_map(self.width(), target.width);
        let y_map = nearest_index_map(self.height(), target.height);
        let src_width = self.width() as usize;
        let src = self.pixels.as_raw();
        let dst_width = target.width as usize;
        let mut raw = vec![MASK_OFF; target.area()];

        let fill_row = |(y, row): (usize, &mut [u8])| {
            let src_row = y_map.get(y).copied().unwrap_or(0) * src_width;
            for (dst, src_x) in row.iter_mut().zip(x_map.iter()) {
                *dst = src.get(src_row + src_x).copied().unwrap_or(MASK_OFF);
            }
        };

        if target.area() >= PARALLEL_PIXEL_THRESHOLD {
            raw.par_chunks_mut(dst_width).enumerate().for_each(fill_row);
        } else {
            raw.chunks_mut(dst_width).enumerate().for_each(fill_row);
        }

        Self {
            pixels: GrayImage::from_raw(target.width, target.height, raw)
                .unwrap_or_else(|| GrayImage::new(target.width, target.height)),
        }
    }
}

/// Source index for each destination index along one axis
pub(crate) fn nearest_index_map(src_len: u32, dst_len: u32) -> Vec<usize> {
    let scale = f64::from(src_len) / f64::from(dst_len);
    let last = src_len.saturating_sub(1) as usize;
    (0..dst_len)
        .map(|i| (((f64::from(i) + 0.5) * scale).floor() as usize).min(last))
        .collect()
}

/// Threshold a probability map into a binary mask
///
/// A pixel is dust iff its probability strictly exceeds `threshold`. The
/// output has the same dimensions as the map.
#[must_use]
pub fn binarize(probability: &ProbabilityMap, threshold: f32) -> BinaryMask {
    let size = probability.size();
    let mut mask = BinaryMask::empty(size);
    if size.is_empty() {
        return mask;
    }
    let width = size.width as usize;
    let values = probability.as_array();

    let fill_row = |(y, row): (usize, &mut [u8])| {
        for (x, out) in row.iter_mut().enumerate() {
            let p = values.get((y, x)).copied().unwrap_or(0.0);
            *out = if p > threshold { MASK_ON } else { MASK_OFF };
        }
    };

    if size.area() >= PARALLEL_PIXEL_THRESHOLD {
        mask.as_raw_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(fill_row);
    } else {
        mask.as_raw_mut().chunks_mut(width).enumerate().for_each(fill_row);
    }
    mask
}
