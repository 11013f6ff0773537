//! Segmentation weights: location, loading and architecture validation
//!
//! The dust detector is a fixed U-Net: four encoder stages (64, 128, 256,
//! 512 channels), a 1024-channel bottleneck and a symmetric decoder with
//! skip connections, taking one grayscale channel and producing one sigmoid
//! channel. Weights are exchanged as ONNX files whose initializers keep the
//! parameter names of the training framework (`enc1.0.weight`, `up4.bias`,
//! `final.weight`, ...).

use crate::error::{DustRemovalError, Result};
use std::path::{Path, PathBuf};

/// Directory names searched for weights, relative to each search root
pub const MODEL_DIRECTORIES: [&str; 3] = ["weights", "checkpoints", "models"];

/// File patterns tried in order inside every model directory
pub const MODEL_PATTERNS: [&str; 4] = ["v5_*.onnx", "v6_*.onnx", "*unet*.onnx", "*.onnx"];

/// Encoder/decoder channel widths
const ENCODER_CHANNELS: [i64; 4] = [64, 128, 256, 512];
const BOTTLENECK_CHANNELS: i64 = 1024;

/// One named parameter tensor of the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub shape: Vec<i64>,
}

impl ParameterSpec {
    fn new(name: impl Into<String>, shape: &[i64]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }
}

/// Two 3x3 convolutions (each followed by ReLU at indices 1 and 3)
fn conv_block(params: &mut Vec<ParameterSpec>, stage: &str, input: i64, output: i64) {
    params.push(ParameterSpec::new(format!("{stage}.0.weight"), &[output, input, 3, 3]));
    params.push(ParameterSpec::new(format!("{stage}.0.bias"), &[output]));
    params.push(ParameterSpec::new(format!("{stage}.2.weight"), &[output, output, 3, 3]));
    params.push(ParameterSpec::new(format!("{stage}.2.bias"), &[output]));
}

/// Complete parameter table of the dust detection U-Net
#[must_use]
pub fn unet_parameters() -> Vec<ParameterSpec> {
    let mut params = Vec::new();

    let mut input = 1;
    for (i, &channels) in ENCODER_CHANNELS.iter().enumerate() {
        conv_block(&mut params, &format!("enc{}", i + 1), input, channels);
        input = channels;
    }
    conv_block(&mut params, "middle", input, BOTTLENECK_CHANNELS);

    let mut below = BOTTLENECK_CHANNELS;
    for (i, &channels) in ENCODER_CHANNELS.iter().enumerate().rev() {
        let stage = i + 1;
        // transposed convolutions store [in, out, k, k]
        params.push(ParameterSpec::new(format!("up{stage}.weight"), &[below, channels, 2, 2]));
        params.push(ParameterSpec::new(format!("up{stage}.bias"), &[channels]));
        conv_block(&mut params, &format!("dec{stage}"), channels * 2, channels);
        below = channels;
    }

    params.push(ParameterSpec::new("final.weight", &[1, ENCODER_CHANNELS[0], 1, 1]));
    params.push(ParameterSpec::new("final.bias", &[1]));
    params
}

/// Check named tensors from a weights file against the fixed architecture
///
/// Extra tensors are ignored. Every missing or misshapen parameter is listed
/// in the returned error.
///
/// # Errors
/// - Any expected parameter is missing or has a different shape
pub fn validate_parameters<'a, I>(found: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [i64])>,
{
    let found: std::collections::HashMap<&str, &[i64]> = found.into_iter().collect();
    let mut problems = Vec::new();

    for expected in unet_parameters() {
        match found.get(expected.name.as_str()) {
            None => problems.push(format!("missing '{}'", expected.name)),
            Some(shape) if *shape != expected.shape.as_slice() => problems.push(format!(
                "'{}' has shape {:?}, expected {:?}",
                expected.name, shape, expected.shape
            )),
            Some(_) => {},
        }
    }

    if problems.is_empty() {
        log::debug!("Weights match U-Net parameter table ({} tensors)", found.len());
        Ok(())
    } else {
        Err(DustRemovalError::model(format!(
            "Weights do not match the U-Net architecture: {}",
            problems.join("; ")
        )))
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Root directories searched for weights, in priority order
#[must_use]
pub fn default_search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }
    if let Some(data_dir) = dirs::data_dir() {
        roots.push(data_dir.join("spotless-film"));
    }
    roots
}

/// Find a weights file below the given roots
///
/// Each root's `weights/`, `checkpoints/` and `models/` directories are
/// tried with [`MODEL_PATTERNS`] in order; within one pattern the matches
/// are sorted descending so the newest versioned file wins.
#[must_use]
pub fn find_model_file(roots: &[PathBuf]) -> Option<PathBuf> {
    for root in roots {
        for directory in MODEL_DIRECTORIES {
            let dir = root.join(directory);
            if !dir.is_dir() {
                continue;
            }
            for pattern in MODEL_PATTERNS {
                let Some(query) = dir.join(pattern).to_str().map(str::to_owned) else {
                    continue;
                };
                let Ok(paths) = glob::glob(&query) else {
                    continue;
                };
                let mut matches: Vec<PathBuf> =
                    paths.filter_map(std::result::Result::ok).filter(|p| p.is_file()).collect();
                matches.sort_by(|a, b| b.cmp(a));
                if let Some(found) = matches.into_iter().next() {
                    log::info!("🔍 Found model weights: {}", found.display());
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Handle on a weights file on disk
#[derive(Debug, Clone)]
pub struct ModelManager {
    path: PathBuf,
}

impl ModelManager {
    /// Use an explicit weights file
    ///
    /// # Errors
    /// - Path does not exist or is not a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DustRemovalError::load(format!(
                "Model weights not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Use `explicit` when given, otherwise search the default locations
    ///
    /// # Errors
    /// - Explicit path missing
    /// - No weights found in any search directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        let roots = default_search_roots();
        find_model_file(&roots)
            .map(|path| Self { path })
            .ok_or_else(|| {
                DustRemovalError::load(format!(
                    "No model weights found. Searched {} under: {}",
                    MODEL_DIRECTORIES.join(", "),
                    roots
                        .iter()
                        .map(|r| r.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the weights file
    ///
    /// # Errors
    /// - File I/O errors
    pub fn load_model(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .map_err(|e| DustRemovalError::file_io_error("read model", &self.path, &e))
    }

    /// Model name and size
    ///
    /// # Errors
    /// - File metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| DustRemovalError::file_io_error("inspect model", &self.path, &e))?;
        let name = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unet")
            .to_string();
        Ok(ModelInfo {
            name,
            path: self.path.clone(),
            size_bytes: metadata.len(),
        })
    }
}
