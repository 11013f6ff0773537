//! Image I/O operations service
//!
//! Keeps file access out of the pipeline so detection, editing and
//! inpainting can be tested on in-memory images.

use crate::{
    config::OutputFormat,
    error::{DustRemovalError, Result},
    mask::BinaryMask,
};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Extensions accepted as scan input
pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the
    /// encoded data.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Data is not a decodable image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(DustRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {e}. Attempting content-based detection.",
                    path_ref.display()
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    DustRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;
                image::load_from_memory(&data)
                    .map_err(|content_err| DustRemovalError::image_load_error(path_ref, &content_err))
            },
        }
    }

    /// Save `image` as `format`, creating parent directories
    ///
    /// JPEG output is encoded at `jpeg_quality` (clamped to 1-100).
    ///
    /// # Errors
    /// - Directory creation or file write failed
    /// - Encoder failure
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DustRemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }

        let result = match format {
            OutputFormat::Png => image.save_with_format(path_ref, ImageFormat::Png),
            OutputFormat::Tiff => image.save_with_format(path_ref, ImageFormat::Tiff),
            OutputFormat::Jpeg => {
                let file = File::create(path_ref)
                    .map_err(|e| DustRemovalError::file_io_error("create output file", path_ref, &e))?;
                let encoder =
                    JpegEncoder::new_with_quality(BufWriter::new(file), jpeg_quality.clamp(1, 100));
                DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
            },
        };

        result.map_err(|e| {
            DustRemovalError::processing_stage_error(
                "image save",
                &format!("Failed to save as {}: {e}", format.extension().to_uppercase()),
                Some(&format!("path: {}", path_ref.display())),
            )
        })?;
        log::debug!("Saved {}", path_ref.display());
        Ok(())
    }

    /// Save-as: infer the format from the extension of `path`
    ///
    /// # Errors
    /// - Extension is not png, jpg, jpeg, tif or tiff
    /// - Write failure
    pub fn save_image_as<P: AsRef<Path>>(image: &DynamicImage, path: P, jpeg_quality: u8) -> Result<OutputFormat> {
        let path_ref = path.as_ref();
        let format = OutputFormat::from_path(path_ref).ok_or_else(|| {
            DustRemovalError::unsupported_format(
                path_ref
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("<none>"),
            )
        })?;
        Self::save_image(image, path_ref, format, jpeg_quality)?;
        Ok(format)
    }

    /// Write a binary mask as an 8-bit grayscale PNG
    ///
    /// # Errors
    /// - Write failure
    pub fn save_mask<P: AsRef<Path>>(mask: &BinaryMask, path: P) -> Result<()> {
        let image = DynamicImage::ImageLuma8(mask.as_gray().clone());
        Self::save_image(&image, path, OutputFormat::Png, 100)
    }

    /// Check if a file path has a supported input extension
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str())
            })
    }

    /// Decode an image from memory
    ///
    /// # Errors
    /// - Data is not a decodable image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            DustRemovalError::load(format!("Failed to decode image from bytes: {e}"))
        })
    }
}
