//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{base_config, Cli, CliBackend, CliInpaintMethod, CliOutputFormat};
use crate::config::{BackendType, DustRemovalConfig, InpaintMethod, OutputFormat, PredictionStrategy};
use anyhow::{Context, Result};

/// Convert CLI arguments to a `DustRemovalConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply the flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<DustRemovalConfig> {
        let mut config = base_config(cli.config.as_deref())?;

        if let Some(threshold) = cli.threshold {
            config.detection.threshold = threshold;
        }
        if let Some(window_size) = cli.window_size {
            config.detection.window_size = window_size;
            // Keep the default half-window overlap unless stride is explicit
            if cli.stride.is_none() && config.detection.stride > window_size {
                config.detection.stride = (window_size / 2).max(1);
            }
        }
        if let Some(stride) = cli.stride {
            config.detection.stride = stride;
        }
        if cli.fast {
            config.detection.strategy = PredictionStrategy::ResizeOnce;
        }

        if let Some(method) = cli.method {
            config.inpainting.method = Self::inpaint_method(method);
        }
        if let Some(path) = &cli.deep_model {
            config.inpainting.deep_model = Some(path.clone());
        }
        if let Some(kernel) = cli.dilate {
            config.inpainting.dilation_kernel = kernel;
        }

        if let Some(format) = cli.format {
            config.output.format = Some(Self::output_format(format));
        }
        if let Some(quality) = cli.jpeg_quality {
            config.output.jpeg_quality = quality;
        }

        if let Some(model) = &cli.model {
            config.execution.model_path = Some(model.clone());
        }
        if let Some(backend) = cli.backend {
            config.execution.backend = Self::backend(backend);
        }

        config.validate().context("Invalid option values")?;
        Ok(config)
    }

    fn inpaint_method(method: CliInpaintMethod) -> InpaintMethod {
        match method {
            CliInpaintMethod::Telea => InpaintMethod::Telea,
            CliInpaintMethod::Multi => InpaintMethod::TeleaMultiPass,
            CliInpaintMethod::Deep => InpaintMethod::Deep,
        }
    }

    fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
        }
    }

    fn backend(backend: CliBackend) -> BackendType {
        match backend {
            CliBackend::Tract => BackendType::Tract,
            CliBackend::Onnx => BackendType::Onnx,
        }
    }
}
