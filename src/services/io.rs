//! Image I/O operations service
//!
//! Decoding and file handling live here so the pipeline only ever sees
//! [`RasterBuffer`]s.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::OutputFormatHandler,
    types::RasterBuffer,
};
use image::DynamicImage;
use std::path::Path;

/// Input extensions the CLI picks up when scanning directories
pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "tif", "tiff"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Extension-based format detection is tried first, then content sniffing.
    ///
    /// # Errors
    /// - `Io` when the file is missing or unreadable
    /// - `InvalidInput` when neither detection method can decode it
    ///
    /// # Examples
    /// ```rust,no_run
    /// use offline_bgremove::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    BgRemovalError::invalid_input(format!(
                        "cannot decode {} ({} bytes): {}; content sniffing: {}",
                        path_ref.display(),
                        data.len(),
                        e,
                        content_err
                    ))
                })
            },
        }
    }

    /// Load a file straight into an RGBA working buffer
    pub fn load_buffer<P: AsRef<Path>>(path: P) -> Result<RasterBuffer> {
        RasterBuffer::from_dynamic_image(&Self::load_image(path)?)
    }

    /// Decode an image from bytes
    ///
    /// # Errors
    /// - `InvalidInput` for empty or undecodable data
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::invalid_input("image data is empty"));
        }
        image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::invalid_input(format!("Failed to decode image from bytes: {}", e))
        })
    }

    /// Read an async stream to the end and decode it
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<DynamicImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Self::load_from_bytes(&buffer)
    }

    /// Encode and save a buffer, creating parent directories as needed
    pub fn save_buffer<P: AsRef<Path>>(
        buffer: &RasterBuffer,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BgRemovalError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        let bytes = OutputFormatHandler::encode(buffer, format)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output image", path_ref, &e))
    }

    /// Check whether a path has an extension the loader understands
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str())
            })
    }
}
