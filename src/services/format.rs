//! Output format handling service
//!
//! Keeps encoder selection out of the pipeline so results can be written to
//! memory or disk in any supported format.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    types::RasterBuffer,
};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Service for encoding pipeline output
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Map an output format to the `image` crate's encoder format
    ///
    /// # Errors
    /// - `UnsupportedFormat` when WebP is requested without the `webp-support` feature
    pub fn image_format(format: OutputFormat) -> Result<ImageFormat> {
        match format {
            OutputFormat::Png => Ok(ImageFormat::Png),
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => Ok(ImageFormat::WebP),
            #[cfg(not(feature = "webp-support"))]
            OutputFormat::WebP => Err(BgRemovalError::unsupported_format(
                "WebP output requires the 'webp-support' feature",
            )),
        }
    }

    /// Encode an RGBA buffer into the bytes of an image file
    ///
    /// # Examples
    /// ```rust
    /// use offline_bgremove::{services::OutputFormatHandler, OutputFormat, RasterBuffer};
    ///
    /// let buffer = RasterBuffer::filled(4, 4, [255, 0, 0, 128])?;
    /// let bytes = OutputFormatHandler::encode(&buffer, OutputFormat::Png)?;
    /// assert_eq!(&bytes[1..4], b"PNG");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode(buffer: &RasterBuffer, format: OutputFormat) -> Result<Vec<u8>> {
        let image_format = Self::image_format(format)?;
        let image = DynamicImage::ImageRgba8(buffer.to_rgba_image()?);
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image_format)
            .map_err(|e| {
                BgRemovalError::processing_stage_error(
                    "encoding",
                    &format!("Failed to encode {}: {}", format, e),
                    Some(&format!("{}x{} RGBA", buffer.width(), buffer.height())),
                )
            })?;
        Ok(bytes)
    }

    /// Get the file extension for a given output format
    ///
    /// ```rust
    /// use offline_bgremove::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::WebP), "webp");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Guess the output format from a path's extension
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<OutputFormat> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP => true,
        }
    }

    /// Whether this build can encode the format
    #[must_use]
    pub fn is_available(format: OutputFormat) -> bool {
        Self::image_format(format).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_png_round_trip() {
        let mut buffer = RasterBuffer::filled(3, 2, [10, 20, 30, 0]).unwrap();
        buffer.set_pixel(1, 1, [200, 100, 50, 177]);
        let bytes = OutputFormatHandler::encode(&buffer, OutputFormat::Png).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1).0, [200, 100, 50, 177]);
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_encode_webp_keeps_alpha() {
        let buffer = RasterBuffer::filled(4, 4, [0, 128, 255, 64]).unwrap();
        let bytes = OutputFormatHandler::encode(&buffer, OutputFormat::WebP).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(2, 2).0, [0, 128, 255, 64]);
    }

    #[cfg(not(feature = "webp-support"))]
    #[test]
    fn test_webp_unavailable_without_feature() {
        let buffer = RasterBuffer::filled(1, 1, [0, 0, 0, 0]).unwrap();
        let err = OutputFormatHandler::encode(&buffer, OutputFormat::WebP).unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_get_extension() {
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::WebP), "webp");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            OutputFormatHandler::from_path("out/result.PNG"),
            Some(OutputFormat::Png)
        );
        assert_eq!(
            OutputFormatHandler::from_path("cutout.webp"),
            Some(OutputFormat::WebP)
        );
        assert_eq!(OutputFormatHandler::from_path("photo.jpg"), None);
        assert_eq!(OutputFormatHandler::from_path("noext"), None);
    }

    #[test]
    fn test_supports_transparency() {
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::WebP));
    }
}
