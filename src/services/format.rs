//! Output naming and format selection

use crate::config::OutputFormat;
use std::path::{Path, PathBuf};

/// Service for choosing output formats and file names
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Format to write for `input`
    ///
    /// An explicit format wins. Otherwise the source format is kept when it
    /// can be written (PNG, JPEG, TIFF); anything else becomes PNG.
    #[must_use]
    pub fn resolve_format(input: &Path, explicit: Option<OutputFormat>) -> OutputFormat {
        explicit
            .or_else(|| OutputFormat::from_path(input))
            .unwrap_or(OutputFormat::Png)
    }

    /// `<stem><suffix>.<ext>` next to `input`, or inside `output_dir`
    ///
    /// The source extension is reused verbatim when it already names the
    /// output format, so `scan.JPEG` becomes `scan_dust_removal.JPEG`.
    #[must_use]
    pub fn output_path(
        input: &Path,
        output_dir: Option<&Path>,
        format: OutputFormat,
        suffix: &str,
    ) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let extension = input
            .extension()
            .and_then(|e| e.to_str())
            .filter(|ext| OutputFormat::from_extension(ext) == Some(format))
            .unwrap_or_else(|| format.extension());
        let file_name = format!("{stem}{suffix}.{extension}");

        match output_dir {
            Some(dir) => dir.join(file_name),
            None => input.with_file_name(file_name),
        }
    }

    /// Path of the companion mask file for `output`
    #[must_use]
    pub fn mask_path(output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        output.with_file_name(format!("{stem}_mask.png"))
    }

    /// Valid quality range and default for formats that take one
    #[must_use]
    pub fn get_quality_range(format: OutputFormat) -> Option<(u8, u8, u8)> {
        match format {
            OutputFormat::Jpeg => Some((1, 100, 95)),
            OutputFormat::Png | OutputFormat::Tiff => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_next_to_input() {
        let path = OutputFormatHandler::output_path(
            Path::new("/scans/roll1/frame07.tif"),
            None,
            OutputFormat::Tiff,
            "_dust_removal",
        );
        assert_eq!(path, PathBuf::from("/scans/roll1/frame07_dust_removal.tif"));
    }

    #[test]
    fn test_output_path_with_format_change_and_dir() {
        let path = OutputFormatHandler::output_path(
            Path::new("/scans/frame.bmp"),
            Some(Path::new("/out")),
            OutputFormat::Png,
            "_dust_removal",
        );
        assert_eq!(path, PathBuf::from("/out/frame_dust_removal.png"));
    }

    #[test]
    fn test_resolve_format() {
        assert_eq!(
            OutputFormatHandler::resolve_format(Path::new("a.jpeg"), None),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormatHandler::resolve_format(Path::new("a.bmp"), None),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormatHandler::resolve_format(Path::new("a.png"), Some(OutputFormat::Tiff)),
            OutputFormat::Tiff
        );
    }

    #[test]
    fn test_mask_path() {
        assert_eq!(
            OutputFormatHandler::mask_path(Path::new("/o/f_dust_removal.jpg")),
            PathBuf::from("/o/f_dust_removal_mask.png")
        );
    }

    #[test]
    fn test_quality_range_only_for_jpeg() {
        assert_eq!(OutputFormatHandler::get_quality_range(OutputFormat::Jpeg), Some((1, 100, 95)));
        assert!(OutputFormatHandler::get_quality_range(OutputFormat::Png).is_none());
    }
}
