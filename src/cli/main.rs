//! Dust removal CLI tool
//!
//! Detects and removes dust from scanned film frames using the headless
//! processor. Directories are expanded (optionally recursively) and every
//! supported image is processed in sorted order.

use super::config::CliConfigBuilder;
use crate::{
    config::DustRemovalConfig,
    processor::DustRemovalProcessor,
    services::{ImageIOService, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate},
    tracing_config::{init_cli_tracing, spans},
    types::ProcessingTimings,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Dust and scratch removal for scanned film
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "spotless")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input images or directories
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Directory for results (default: next to each input)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Detection threshold in (0, 1)
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Tile size for patch inference
    #[arg(long)]
    pub window_size: Option<u32>,

    /// Step between tiles
    #[arg(long)]
    pub stride: Option<u32>,

    /// Predict once at a fixed resolution instead of tiling
    #[arg(long)]
    pub fast: bool,

    /// Inpainting method
    #[arg(short, long, value_enum)]
    pub method: Option<CliInpaintMethod>,

    /// Deep inpainting model (ONNX), used with `--method deep`
    #[arg(long, value_name = "FILE")]
    pub deep_model: Option<PathBuf>,

    /// Dilation kernel size in pixels
    #[arg(long)]
    pub dilate: Option<u32>,

    /// Output format (default: keep the input format when possible)
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (0-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Segmentation weights (default: search weights/, checkpoints/, models/)
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Inference backend
    #[arg(short, long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Also write the dilated dust mask as `<output>_mask.png`
    #[arg(long)]
    pub save_mask: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Tiff,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliInpaintMethod {
    /// Single Telea pass
    Telea,
    /// Telea at radii 3, 7, 11
    Multi,
    /// Deep model with Telea fallback
    Deep,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Tract,
    Onnx,
}

/// Progress reporter that drives an indicatif bar message
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if update.stage == ProcessingStage::Detection {
            self.bar
                .set_message(format!("{} {}%", update.description, update.progress));
        } else {
            self.bar.set_message(update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::debug!("{}", timings.summary());
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .suspend(|| error!("❌ Error during {}: {error}", stage.description()));
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    let files = collect_inputs(&cli.input, cli.recursive, &config.output.suffix)?;
    if files.is_empty() {
        warn!("No supported images found in the provided inputs");
        return Ok(());
    }

    if let Some(dir) = &cli.output_dir {
        if dir.is_file() {
            anyhow::bail!(
                "Output path exists and is a file, not a directory: {}",
                dir.display()
            );
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    info!("Starting dust removal");
    info!(
        "Backend: {}, threshold: {}, method: {}",
        config.execution.backend, config.detection.threshold, config.inpainting.method
    );

    let processor = DustRemovalProcessor::new(config).context("Failed to create processor")?;
    let output_dir = cli.output_dir.clone();
    let save_mask = cli.save_mask;

    // Inference and inpainting are CPU bound
    let start_time = Instant::now();
    let (processed, failed) = tokio::task::spawn_blocking(move || {
        process_files(processor, &files, output_dir.as_deref(), save_mask)
    })
    .await
    .context("Processing thread failed")??;

    info!(
        "Processed {processed} image(s) in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    if failed > 0 {
        warn!("Some files failed to process. Processed: {processed}, Failed: {failed}");
        if processed == 0 {
            anyhow::bail!("All {failed} input(s) failed");
        }
    }
    Ok(())
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

fn process_files(
    mut processor: DustRemovalProcessor,
    files: &[PathBuf],
    output_dir: Option<&Path>,
    save_mask: bool,
) -> Result<(usize, usize)> {
    let _batch = spans::batch_processing(files.len(), &processor.config().execution.backend.to_string()).entered();
    let bar = progress_bar(files.len())?;
    processor.set_progress_tracker(ProgressTracker::new(Box::new(BarReporter { bar: bar.clone() })));

    processor
        .initialize()
        .context("Failed to initialize the segmentation model")?;

    let mut processed = 0;
    let mut failed = 0;
    let batch_start = Instant::now();

    for input in files {
        let _file = spans::file_processing(input).entered();
        bar.set_message(format!("Processing {}", input.display()));
        match processor.process_file(input, output_dir, save_mask) {
            Ok((saved, timings)) => {
                processed += 1;
                bar.suspend(|| {
                    info!(
                        "✅ {} -> {} ({}ms)",
                        input.display(),
                        saved.image.display(),
                        timings.total_ms
                    );
                });
            },
            Err(e) => {
                failed += 1;
                bar.suspend(|| error!("❌ Failed to process {}: {e}", input.display()));
            },
        }
        bar.inc(1);
    }

    bar.finish_with_message(format!("Completed! Processed: {processed}, Failed: {failed}"));

    if files.len() > 1 {
        let total = batch_start.elapsed().as_secs_f64();
        info!("📊 Batch processing summary:");
        info!("  ├─ Files processed: {processed}");
        info!("  ├─ Files failed: {failed}");
        info!("  ├─ Total time: {total:.2}s");
        info!(
            "  └─ Average per file: {:.2}s",
            if processed > 0 { total / processed as f64 } else { 0.0 }
        );
    }
    Ok((processed, failed))
}

/// Expand files and directories into a sorted list of supported images
///
/// Files whose stem already ends in `suffix` are previous results and are
/// skipped when found inside a directory.
pub(crate) fn collect_inputs(inputs: &[PathBuf], recursive: bool, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in inputs {
        if path.is_file() {
            if ImageIOService::is_supported_format(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(path, recursive, suffix)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool, suffix: &str) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_result = !suffix.is_empty()
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.ends_with(suffix));
        if ImageIOService::is_supported_format(path) && !is_result {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Load a JSON config or fall back to defaults
pub(crate) fn base_config(path: Option<&Path>) -> Result<DustRemovalConfig> {
    match path {
        Some(path) => DustRemovalConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(DustRemovalConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_collect_inputs_respects_recursion_and_skips_results() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("b.tif"));
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("a_dust_removal.jpg"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("roll2/c.png"));

        let flat = collect_inputs(&[dir.path().to_path_buf()], false, "_dust_removal").unwrap();
        assert_eq!(flat, vec![dir.path().join("a.jpg"), dir.path().join("b.tif")]);

        let deep = collect_inputs(&[dir.path().to_path_buf()], true, "_dust_removal").unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("roll2/c.png")));
    }

    #[test]
    fn test_missing_input_is_error() {
        assert!(collect_inputs(&[PathBuf::from("/no/such/scan.tif")], false, "_x").is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "spotless", "--threshold", "0.1", "--fast", "--method", "multi", "--save-mask", "-vv", "scan.tif",
        ])
        .unwrap();
        assert_eq!(cli.threshold, Some(0.1));
        assert!(cli.fast);
        assert_eq!(cli.method, Some(CliInpaintMethod::Multi));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.input, vec![PathBuf::from("scan.tif")]);
        assert!(Cli::try_parse_from(["spotless"]).is_err());
    }
}
