#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Spotless Film
//!
//! Dust and scratch removal for scanned film, built around a U-Net that
//! predicts a per-pixel dust probability and a Telea fast-marching inpainter
//! that fills the detected specks.
//!
//! The crate has two front ends over the same pipeline:
//!
//! - [`DustRemovalProcessor`]: headless, synchronous, one image at a time.
//!   This is what the `spotless` CLI drives.
//! - [`DustRemovalSession`]: an interactive editing session with background
//!   detection/removal tasks, brush and eraser strokes, undo, re-thresholding
//!   and a zoomable view. A GUI renders from its accessors and feeds it input
//!   events.
//!
//! ## Features
//!
//! - **Tiled detection**: overlapping windows over a reflection-padded image,
//!   averaged where they overlap, or a single resized prediction (`fast`)
//! - **Two backends**: Tract (pure Rust, default) and ONNX Runtime
//! - **Inpainting**: single-pass Telea, multi-pass Telea (radii 3, 7, 11) or
//!   an optional LaMa-style deep model with Telea fallback
//! - **Mask editing**: brush/eraser strokes on a low-resolution working copy,
//!   a 20-step undo history and dirty-rect sync to full resolution
//! - **CLI**: batch processing with progress bars (enable with `cli`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spotless_film::{DustRemovalConfig, DustRemovalProcessor, InpaintMethod};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = DustRemovalConfig::builder()
//!     .threshold(0.05)
//!     .inpaint_method(InpaintMethod::TeleaMultiPass)
//!     .build()?;
//!
//! let mut processor = DustRemovalProcessor::new(config)?;
//! let (saved, timings) = processor.process_file("scan.tif".as_ref(), None, false)?;
//! println!("{} in {}ms", saved.image.display(), timings.total_ms);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust inference backend
//! - `onnx`: ONNX Runtime backend with execution provider selection
//! - `cli` (default): command-line interface and tracing setup
//! - `tracing-json`, `tracing-files`: extra log formats for the CLI
//!
//! The library itself only emits `log`/`tracing` events; install a subscriber
//! (or use [`tracing_config`] with the `cli` feature) to see them.

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod inference;
pub mod inpaint;
pub mod mask;
pub mod models;
pub mod processor;
pub mod services;
pub mod session;
pub mod task;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod view;

// Public API exports
pub use backends::*;
pub use config::{
    BackendType, DetectionConfig, DustRemovalConfig, DustRemovalConfigBuilder, EditingConfig,
    ExecutionConfig, ExecutionProvider, InpaintMethod, InpaintingConfig, OutputConfig, OutputFormat,
    PredictionStrategy,
};
pub use error::{DustRemovalError, Result};
pub use inference::SegmentationBackend;
pub use inpaint::{blend, inpaint_telea, inpaint_telea_multi_pass, DeepInpaintModel, InpaintStrategy};
pub use mask::{binarize, dilate, BinaryMask, MaskEditor, MaskHistory, StrokeTool};
pub use models::{find_model_file, ModelInfo, ModelManager};
pub use processor::{
    build_inpaint_strategy, detect_dust, remove_dust, BackendFactory, DefaultBackendFactory,
    DustRemovalProcessor, ProcessedImage, SavedOutput,
};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use session::{ChangeSet, DustRemovalSession, MaskStatus, SessionChange, SessionObserver};
pub use task::{ProcessingTask, TaskKind};
pub use types::{DetectionResult, ImageSize, ProbabilityMap, ProcessingTimings, RemovalResult};
pub use view::{CanvasPoint, CanvasRect, CanvasSize, ImagePoint, ToolMode, ViewMode, ViewState};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};
