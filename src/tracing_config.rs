//! Tracing subscriber setup for the command line front end
//!
//! The library only emits events (`log` and `tracing`); applications decide
//! where they go. The `spotless` binary installs a registry with an
//! `EnvFilter` derived from `-v` or `RUST_LOG`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// How events are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Coloured compact console output (default)
    Console,
    /// Compact output without colours, for CI logs
    Compact,
    /// One JSON object per event, with span context
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where events are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// stderr, so stdout stays free for piping
    Console,
    /// A single log file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Console plus a daily rotated file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps a non-blocking file writer alive; drop it at the end of `main`
#[cfg(feature = "tracing-files")]
pub type TracingGuard = Option<tracing_appender::non_blocking::WorkerGuard>;
/// Keeps a non-blocking file writer alive; drop it at the end of `main`
#[cfg(not(feature = "tracing-files"))]
pub type TracingGuard = Option<()>;

/// Subscriber settings, assembled with the `with_*` methods and applied by [`TracingConfig::init`]
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (0 = info, 1 = debug, 2+ = trace)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Filter directive that replaces both `-v` and `RUST_LOG`
    pub env_filter: Option<String>,
    /// Identifier attached to the first event of a run
    pub run_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            run_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Level directive for `-v` repetitions
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(directive) = &self.env_filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        // RUST_LOG wins over the default verbosity, -v wins over RUST_LOG
        if self.verbosity == 0 {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        Ok(EnvFilter::try_new(self.verbosity_to_filter())?)
    }

    /// Install as the global subscriber
    ///
    /// The returned guard flushes the file writer when dropped.
    ///
    /// # Errors
    /// Fails on a malformed filter or when a subscriber is already set.
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let registry = Registry::default().with(self.filter()?);
        let guard: TracingGuard = match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
                None
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
                None
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
                None
            },

            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::File(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::never(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("spotless.log")),
                );
                let (file_writer, worker) = non_blocking(file_appender);
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .compact();
                registry.with(fmt_layer).try_init()?;
                Some(worker)
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::Both(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let console_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(*format == TracingFormat::Console)
                    .with_target(false)
                    .compact();

                let file_appender = rolling::daily(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_stem()
                        .unwrap_or_else(|| std::ffi::OsStr::new("spotless")),
                );
                let (file_writer, worker) = non_blocking(file_appender);
                let file_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .compact();

                registry.with(console_layer).with(file_layer).try_init()?;
                Some(worker)
            },
        };

        if let Some(run_id) = &self.run_id {
            tracing::debug!(run_id = %run_id, "🚀 Dust removal run started");
        }
        Ok(guard)
    }
}

/// Coloured console output at the `-v` level, tagged with a fresh run id
///
/// # Errors
/// See [`TracingConfig::init`].
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_run_id(uuid::Uuid::new_v4().to_string())
        .init()
}

pub mod spans {
    use std::path::Path;
    use tracing::{info_span, Span};

    /// Covers every frame handed to one CLI invocation
    #[must_use]
    pub fn batch_processing(frames: usize, backend: &str) -> Span {
        info_span!("batch", frames, backend = %backend)
    }

    #[must_use]
    pub fn file_processing(frame: &Path) -> Span {
        let name = frame.file_name().map(|n| n.to_string_lossy().into_owned());
        info_span!("frame", name = name.as_deref().unwrap_or("?"), path = %frame.display())
    }
}
