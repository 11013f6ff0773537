//! Fast-marching inpainting (Telea 2004)
//!
//! Masked pixels are filled in order of their distance from the mask
//! boundary. Each newly reached pixel becomes the weighted average of the
//! already-known pixels inside a disk of the given radius, where the weight
//! combines direction (alignment with the distance-field gradient), geometric
//! distance and level-set proximity.

use crate::error::{DustRemovalError, Result};
use crate::mask::BinaryMask;
use crate::types::ImageSize;
use image::RgbImage;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

/// Distance assigned to pixels the front has not reached
const FAR: f32 = 1.0e6;

#[derive(Debug, Clone, Copy)]
struct FrontEntry {
    distance: f32,
    index: usize,
}

impl PartialEq for FrontEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontEntry {}

impl PartialOrd for FrontEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontEntry {
    // Reversed so the max-heap pops the smallest distance first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.index.cmp(&self.index))
    }
}

struct FastMarch<'a> {
    width: usize,
    height: usize,
    flags: Vec<u8>,
    distance: Vec<f32>,
    pixels: &'a mut [u8],
    radius: i64,
}

impl FastMarch<'_> {
    fn flag(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return INSIDE;
        }
        self.flags[y as usize * self.width + x as usize]
    }

    fn dist(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return FAR;
        }
        self.distance[y as usize * self.width + x as usize]
    }

    /// First-order eikonal update from two orthogonal neighbours
    fn solve(&self, (x1, y1): (i64, i64), (x2, y2): (i64, i64)) -> f32 {
        let a = self.dist(x1, y1);
        let b = self.dist(x2, y2);
        let known_a = self.flag(x1, y1) != INSIDE;
        let known_b = self.flag(x2, y2) != INSIDE;
        match (known_a, known_b) {
            (true, true) if (a - b).abs() >= 1.0 => 1.0 + a.min(b),
            (true, true) => (a + b + (2.0 - (a - b) * (a - b)).sqrt()) * 0.5,
            (true, false) => 1.0 + a,
            (false, true) => 1.0 + b,
            (false, false) => 1.0 + a.min(b),
        }
    }

    fn arrival_time(&self, x: i64, y: i64) -> f32 {
        [
            self.solve((x - 1, y), (x, y - 1)),
            self.solve((x + 1, y), (x, y - 1)),
            self.solve((x - 1, y), (x, y + 1)),
            self.solve((x + 1, y), (x, y + 1)),
        ]
        .into_iter()
        .fold(FAR, f32::min)
    }

    /// Central difference of the distance field over known neighbours
    fn gradient(&self, x: i64, y: i64) -> (f32, f32) {
        let centre = self.dist(x, y);
        let axis = |(px, py): (i64, i64), (nx, ny): (i64, i64)| -> f32 {
            let prev_known = self.flag(px, py) != INSIDE;
            let next_known = self.flag(nx, ny) != INSIDE;
            match (prev_known, next_known) {
                (true, true) => (self.dist(nx, ny) - self.dist(px, py)) * 0.5,
                (false, true) => self.dist(nx, ny) - centre,
                (true, false) => centre - self.dist(px, py),
                (false, false) => 0.0,
            }
        };
        (axis((x - 1, y), (x + 1, y)), axis((x, y - 1), (x, y + 1)))
    }

    fn fill_pixel(&mut self, x: i64, y: i64) {
        let (grad_x, grad_y) = self.gradient(x, y);
        let centre = self.dist(x, y);
        let radius_sq = (self.radius * self.radius) as f32;
        let mut sum = [0.0_f32; 3];
        let mut total = 0.0_f32;

        for ky in (y - self.radius)..=(y + self.radius) {
            for kx in (x - self.radius)..=(x + self.radius) {
                if (kx == x && ky == y) || self.flag(kx, ky) == INSIDE {
                    continue;
                }
                let rx = (x - kx) as f32;
                let ry = (y - ky) as f32;
                let len_sq = rx * rx + ry * ry;
                if len_sq > radius_sq {
                    continue;
                }
                let dst = 1.0 / (len_sq * len_sq.sqrt());
                let lev = 1.0 / (1.0 + (self.dist(kx, ky) - centre).abs());
                let mut dir = rx * grad_x + ry * grad_y;
                if dir.abs() <= 0.01 {
                    dir = 1.0e-6;
                }
                let weight = (dst * lev * dir).abs();

                let offset = (ky as usize * self.width + kx as usize) * 3;
                for (channel, acc) in sum.iter_mut().enumerate() {
                    *acc += weight * f32::from(self.pixels[offset + channel]);
                }
                total += weight;
            }
        }

        if total > 0.0 {
            let offset = (y as usize * self.width + x as usize) * 3;
            for (channel, acc) in sum.iter().enumerate() {
                self.pixels[offset + channel] = (acc / total).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Fill the "on" pixels of `mask` in `image`
///
/// Pixels outside the mask are copied unchanged. An all-off mask returns a
/// clone of the input.
///
/// # Errors
/// - Mask and image sizes differ
/// - Radius is not positive
pub fn inpaint_telea(image: &RgbImage, mask: &BinaryMask, radius: f32) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if mask.size() != ImageSize::new(width, height) {
        return Err(DustRemovalError::inpainting(format!(
            "Mask {} does not match image {width}x{height}",
            mask.size()
        )));
    }
    if radius.is_nan() || radius <= 0.0 {
        return Err(DustRemovalError::inpainting(format!(
            "Inpainting radius must be positive, got {radius}"
        )));
    }

    let mut output = image.clone();
    if mask.is_all_off() {
        return Ok(output);
    }

    let (width, height) = (width as usize, height as usize);
    let flags: Vec<u8> = mask
        .as_raw()
        .iter()
        .map(|&v| if v > 0 { INSIDE } else { KNOWN })
        .collect();
    let distance: Vec<f32> = flags
        .iter()
        .map(|&f| if f == INSIDE { FAR } else { 0.0 })
        .collect();

    let mut march = FastMarch {
        width,
        height,
        flags,
        distance,
        pixels: &mut *output,
        radius: radius.round().max(1.0) as i64,
    };

    // Seed the front with known pixels touching the mask
    let mut heap = BinaryHeap::new();
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            if march.flag(x, y) != KNOWN {
                continue;
            }
            let touches_mask = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .into_iter()
                .any(|(nx, ny)| {
                    nx >= 0
                        && ny >= 0
                        && (nx as usize) < width
                        && (ny as usize) < height
                        && march.flag(nx, ny) == INSIDE
                });
            if touches_mask {
                let index = y as usize * width + x as usize;
                march.flags[index] = BAND;
                heap.push(FrontEntry {
                    distance: 0.0,
                    index,
                });
            }
        }
    }

    let mut filled = 0usize;
    while let Some(FrontEntry { index, .. }) = heap.pop() {
        if march.flags[index] == KNOWN {
            continue;
        }
        march.flags[index] = KNOWN;
        let x = (index % width) as i64;
        let y = (index / width) as i64;

        for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
            if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                continue;
            }
            if march.flag(nx, ny) != INSIDE {
                continue;
            }
            let neighbour = ny as usize * width + nx as usize;
            march.distance[neighbour] = march.arrival_time(nx, ny);
            march.flags[neighbour] = BAND;
            march.fill_pixel(nx, ny);
            filled += 1;
            heap.push(FrontEntry {
                distance: march.distance[neighbour],
                index: neighbour,
            });
        }
    }

    log::trace!("Telea radius {radius}: filled {filled} pixels");
    Ok(output)
}

/// Apply [`inpaint_telea`] once per radius, each pass on the previous output
///
/// # Errors
/// - No radii given
/// - Any pass fails
pub fn inpaint_telea_multi_pass(image: &RgbImage, mask: &BinaryMask, radii: &[f32]) -> Result<RgbImage> {
    let Some((&first, rest)) = radii.split_first() else {
        return Err(DustRemovalError::inpainting("Multi-pass inpainting needs at least one radius"));
    };
    let mut current = inpaint_telea(image, mask, first)?;
    for &radius in rest {
        current = inpaint_telea(&current, mask, radius)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn square_mask(size: u32, from: u32, to: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(size, size);
        for y in from..to {
            for x in from..to {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn test_front_entry_pops_smallest_distance() {
        let mut heap = BinaryHeap::new();
        heap.push(FrontEntry { distance: 3.0, index: 0 });
        heap.push(FrontEntry { distance: 1.0, index: 1 });
        heap.push(FrontEntry { distance: 2.0, index: 2 });
        assert_eq!(heap.pop().map(|e| e.index), Some(1));
        assert_eq!(heap.pop().map(|e| e.index), Some(2));
    }

    #[test]
    fn test_solid_colour_is_preserved() {
        let image = RgbImage::from_pixel(32, 32, Rgb([90, 140, 200]));
        let mask = square_mask(32, 10, 20);
        let result = inpaint_telea(&image, &mask, 5.0).unwrap();
        assert!(result.pixels().all(|p| *p == Rgb([90, 140, 200])));
    }

    #[test]
    fn test_masked_speck_is_removed() {
        let mut image = RgbImage::from_pixel(24, 24, Rgb([200, 200, 200]));
        for y in 11..13 {
            for x in 11..13 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let mask = square_mask(24, 11, 13);
        let result = inpaint_telea(&image, &mask, 3.0).unwrap();
        assert_eq!(*result.get_pixel(11, 11), Rgb([200, 200, 200]));
        assert_eq!(*result.get_pixel(12, 12), Rgb([200, 200, 200]));
    }

    #[test]
    fn test_unmasked_pixels_untouched() {
        let image = RgbImage::from_fn(20, 20, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 7]));
        let mask = square_mask(20, 5, 9);
        let result = inpaint_telea(&image, &mask, 5.0).unwrap();
        for (x, y, pixel) in result.enumerate_pixels() {
            if !mask.is_on(x, y) {
                assert_eq!(pixel, image.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_gradient_fill_stays_within_neighbour_range() {
        let image = RgbImage::from_fn(30, 30, |x, _| Rgb([(x * 8) as u8, 0, 0]));
        let mask = square_mask(30, 12, 18);
        let result = inpaint_telea(&image, &mask, 5.0).unwrap();
        for y in 12..18 {
            for x in 12..18 {
                let value = result.get_pixel(x, y).0[0];
                assert!((40..=200).contains(&value), "({x},{y}) = {value}");
            }
        }
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let image = RgbImage::new(10, 10);
        let mask = BinaryMask::new(5, 5);
        assert!(inpaint_telea(&image, &mask, 5.0).is_err());
    }

    #[test]
    fn test_multi_pass_requires_radius() {
        let image = RgbImage::new(4, 4);
        let mask = BinaryMask::new(4, 4);
        assert!(inpaint_telea_multi_pass(&image, &mask, &[]).is_err());
        assert!(inpaint_telea_multi_pass(&image, &mask, &[3.0, 7.0, 11.0]).is_ok());
    }
}
