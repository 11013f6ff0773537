//! Tiled patch inference with overlap averaging

use super::preprocess::window_to_tensor;
use crate::error::{DustRemovalError, Result};
use crate::inference::{run_checked, SegmentationBackend};
use crate::types::ProbabilityMap;
use ndarray::{s, Array2};

/// Floor applied to the per-pixel window count before dividing
const COUNT_EPSILON: f32 = 1e-8;

/// Smallest length `>= len` that windows of `window` stepping by `stride`
/// cover exactly
#[must_use]
pub fn padded_length(len: usize, window: usize, stride: usize) -> usize {
    if len <= window || stride == 0 {
        return window.max(len);
    }
    let steps = (len - window).div_ceil(stride);
    window + steps * stride
}

/// Start offsets of the windows along one padded axis
#[must_use]
pub fn window_origins(padded: usize, window: usize, stride: usize) -> Vec<usize> {
    if padded < window || stride == 0 {
        return Vec::new();
    }
    (0..=padded - window).step_by(stride).collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
#[must_use]
pub fn reflect_index(index: usize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = index % period;
    if m < len {
        m
    } else {
        period - m
    }
}

/// Extend `map` to `(height, width)` by edge reflection at the bottom and right
#[must_use]
pub fn reflect_pad(map: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (rows, cols) = map.dim();
    if (rows, cols) == (height, width) {
        return map.clone();
    }
    Array2::from_shape_fn((height, width), |(y, x)| {
        map.get((reflect_index(y, rows), reflect_index(x, cols)))
            .copied()
            .unwrap_or(0.0)
    })
}

/// Run `backend` over overlapping windows of `normalized` and average
///
/// `normalized` holds intensities in `[0, 1]`. `on_window(done, total)` is
/// called after every window.
///
/// # Errors
/// - Zero window or stride
/// - Any window fails to run; no partial map is returned
pub fn predict_tiled(
    normalized: &Array2<f32>,
    backend: &mut dyn SegmentationBackend,
    window: usize,
    stride: usize,
    on_window: &mut dyn FnMut(usize, usize),
) -> Result<ProbabilityMap> {
    if window == 0 || stride == 0 {
        return Err(DustRemovalError::invalid_config(format!(
            "Window size ({window}) and stride ({stride}) must be positive"
        )));
    }
    let (height, width) = normalized.dim();
    let padded_height = padded_length(height, window, stride);
    let padded_width = padded_length(width, window, stride);
    let padded = reflect_pad(normalized, padded_height, padded_width);

    let rows = window_origins(padded_height, window, stride);
    let cols = window_origins(padded_width, window, stride);
    let total = rows.len() * cols.len();
    log::debug!(
        "Tiling {width}x{height} (padded {padded_width}x{padded_height}) into {total} windows of {window}px, stride {stride}"
    );

    let mut accumulator = Array2::<f32>::zeros((padded_height, padded_width));
    let mut counts = Array2::<f32>::zeros((padded_height, padded_width));
    let mut done = 0;

    for &y in &rows {
        for &x in &cols {
            let input = window_to_tensor(padded.slice(s![y..y + window, x..x + window]));
            let output = run_checked(backend, &input)?;
            let prediction = output.slice(s![0, 0, .., ..]);

            accumulator
                .slice_mut(s![y..y + window, x..x + window])
                .zip_mut_with(&prediction, |acc, p| *acc += *p);
            counts
                .slice_mut(s![y..y + window, x..x + window])
                .mapv_inplace(|c| c + 1.0);

            done += 1;
            on_window(done, total);
        }
    }

    let averaged = Array2::from_shape_fn((height, width), |index| {
        let sum = accumulator.get(index).copied().unwrap_or(0.0);
        let count = counts.get(index).copied().unwrap_or(0.0);
        (sum / count.max(COUNT_EPSILON)).clamp(0.0, 1.0)
    });
    ProbabilityMap::new(averaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSegmentationBackend;
    use crate::config::ExecutionConfig;

    fn ready(mut backend: MockSegmentationBackend) -> MockSegmentationBackend {
        backend.initialize(&ExecutionConfig::default()).unwrap();
        backend
    }

    #[test]
    fn test_padded_length() {
        assert_eq!(padded_length(1024, 1024, 512), 1024);
        assert_eq!(padded_length(100, 1024, 512), 1024);
        assert_eq!(padded_length(1025, 1024, 512), 1536);
        assert_eq!(padded_length(2000, 1024, 512), 2048);
        assert_eq!(padded_length(10, 4, 3), 10);
        assert_eq!(padded_length(11, 4, 3), 13);
    }

    #[test]
    fn test_window_origins_cover_padded_axis() {
        assert_eq!(window_origins(2048, 1024, 512), vec![0, 512, 1024]);
        assert_eq!(window_origins(1024, 1024, 1024), vec![0]);
        let origins = window_origins(13, 4, 3);
        assert_eq!(origins.last().copied().unwrap() + 4, 13);
    }

    #[test]
    fn test_reflect_index() {
        // numpy "reflect" for [a b c]: ... c b | a b c | b a b c ...
        assert_eq!(reflect_index(3, 3), 1);
        assert_eq!(reflect_index(4, 3), 0);
        assert_eq!(reflect_index(5, 3), 1);
        assert_eq!(reflect_index(7, 1), 0);
    }

    #[test]
    fn test_single_window_matches_direct_inference() {
        let image = Array2::from_shape_fn((16, 16), |(y, x)| ((y * 16 + x) % 7) as f32 / 7.0);
        let mut backend = ready(MockSegmentationBackend::identity());
        let map = predict_tiled(&image, &mut backend, 16, 16, &mut |_, _| {}).unwrap();
        assert_eq!(backend.infer_calls(), 1);
        assert_eq!(map.as_array(), &image);
    }

    #[test]
    fn test_overlapping_windows_average_to_identity() {
        let image = Array2::from_shape_fn((23, 37), |(y, x)| ((x * 3 + y * 5) % 11) as f32 / 11.0);
        let mut backend = ready(MockSegmentationBackend::identity());
        let mut progress = Vec::new();
        let map = predict_tiled(&image, &mut backend, 8, 4, &mut |done, total| {
            progress.push((done, total));
        })
        .unwrap();

        assert_eq!(map.size().width, 37);
        assert_eq!(map.size().height, 23);
        for (a, b) in map.as_array().iter().zip(image.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        let total = progress.last().unwrap().1;
        assert_eq!(progress.len(), total);
        assert_eq!(backend.infer_calls(), total);
    }

    #[test]
    fn test_failure_aborts_without_map() {
        let image = Array2::zeros((8, 8));
        let mut backend = ready(MockSegmentationBackend::new_failing_inference());
        let err = predict_tiled(&image, &mut backend, 4, 4, &mut |_, _| {}).unwrap_err();
        assert!(err.is_inference());
    }
}
