use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use instant::Duration;
use ndarray::{Array2, Array4};
use spotless_film::{
    config::ExecutionConfig,
    detection::predict_tiled,
    dilate, inpaint_telea, inpaint_telea_multi_pass,
    mask::brush::{stamp_segment, MaskPoint},
    models::ModelInfo,
    BinaryMask, Result, SegmentationBackend, StrokeTool,
};
use std::path::PathBuf;

/// Network stand-in so tiling overhead is measured without a model
struct PassThrough;

impl SegmentationBackend for PassThrough {
    fn initialize(&mut self, _config: &ExecutionConfig) -> Result<Option<Duration>> {
        Ok(None)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        Ok(input.mapv(|v| 1.0 - v))
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "pass-through".to_string(),
            path: PathBuf::new(),
            size_bytes: 0,
        })
    }
}

fn speckled_mask(size: u32, every: u32) -> BinaryMask {
    let mut mask = BinaryMask::new(size, size);
    for y in (0..size).step_by(every as usize) {
        for x in (0..size).step_by(every as usize) {
            mask.set(x, y, true);
        }
    }
    mask
}

fn benchmark_tiling(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiled_inference");
    group.measurement_time(Duration::from_secs(10));

    for size in [512usize, 1024, 2048] {
        let normalized = Array2::<f32>::from_elem((size, size), 0.8);
        group.bench_with_input(BenchmarkId::from_parameter(size), &normalized, |b, input| {
            let mut backend = PassThrough;
            b.iter(|| predict_tiled(black_box(input), &mut backend, 256, 128, &mut |_, _| {}));
        });
    }
    group.finish();
}

fn benchmark_dilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("dilation");
    let mask = speckled_mask(2048, 37);
    for kernel in [3u32, 5, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(kernel), &kernel, |b, &kernel| {
            b.iter(|| dilate(black_box(&mask), kernel));
        });
    }
    group.finish();
}

fn benchmark_strokes(c: &mut Criterion) {
    c.bench_function("stroke_segment_r20", |b| {
        let mut mask = BinaryMask::new(1024, 1024);
        b.iter(|| {
            stamp_segment(
                &mut mask,
                MaskPoint::new(10.0, 10.0),
                MaskPoint::new(1000.0, 900.0),
                black_box(20.0),
                StrokeTool::Brush,
            )
        });
    });
}

fn benchmark_inpainting(c: &mut Criterion) {
    let mut group = c.benchmark_group("telea");
    group.sample_size(10);
    let image = RgbImage::from_fn(512, 512, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mask = dilate(&speckled_mask(512, 23), 5).unwrap_or_else(|_| BinaryMask::new(512, 512));

    group.bench_function("single_pass", |b| {
        b.iter(|| inpaint_telea(black_box(&image), &mask, 5.0));
    });
    group.bench_function("multi_pass", |b| {
        b.iter(|| inpaint_telea_multi_pass(black_box(&image), &mask, &[3.0, 7.0, 11.0]));
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_tiling,
    benchmark_dilation,
    benchmark_strokes,
    benchmark_inpainting
);
criterion_main!(benches);
