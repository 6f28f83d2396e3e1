//! Core types for background removal operations

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::{ImageIOService, OutputFormatHandler},
};
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageBuffer, RgbaImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest pixel count for which a working surface is allocated
pub const MAX_PIXELS: u64 = 100_000_000;

/// Per-pixel edge strength in [0,1], shape `(height, width)`
pub type EdgeMap = Array2<f32>;

/// Owned, packed RGBA8 pixel buffer
///
/// Source and working buffers are always distinct instances; operations that
/// change pixels return a new buffer instead of aliasing the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterBuffer {
    /// Create a buffer from packed RGBA bytes
    ///
    /// # Errors
    /// - `InvalidInput` for zero dimensions or a byte length other than `4*width*height`
    /// - `SurfaceUnavailable` when the image is too large to allocate working buffers
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let pixels = Self::checked_pixel_count(width, height)?;
        if data.len() != pixels * 4 {
            return Err(BgRemovalError::invalid_input(format!(
                "RGBA buffer for {}x{} must hold {} bytes, got {}",
                width,
                height,
                pixels * 4,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a buffer where every pixel has the same RGBA value
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let pixels = Self::checked_pixel_count(width, height)?;
        let data = rgba.iter().copied().cycle().take(pixels * 4).collect();
        Self::new(width, height, data)
    }

    /// Take ownership of an `RgbaImage`
    pub fn from_rgba_image(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Convert any decoded image to an RGBA8 buffer
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        Self::from_rgba_image(image.to_rgba8())
    }

    /// Copy the pixels into an `RgbaImage`
    ///
    /// # Errors
    /// - `SurfaceUnavailable` if the image surface cannot be constructed
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::surface_unavailable(format!(
                "cannot build {}x{} RGBA surface",
                self.width, self.height
            ))
        })
    }

    fn checked_pixel_count(width: u32, height: u32) -> Result<usize> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_input(format!(
                "image has zero dimension ({}x{})",
                width, height
            )));
        }
        let pixels = u64::from(width) * u64::from(height);
        if pixels > MAX_PIXELS {
            return Err(BgRemovalError::surface_unavailable(format!(
                "{}x{} exceeds the {} pixel working-surface limit",
                width, height, MAX_PIXELS
            )));
        }
        usize::try_from(pixels)
            .map_err(|_| BgRemovalError::surface_unavailable("pixel count exceeds address space"))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw packed RGBA bytes
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Linear pixel index of `(x, y)`
    #[must_use]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// RGBA value at `(x, y)`
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixel_at(self.index(x, y))
    }

    /// RGBA value at a linear pixel index
    #[must_use]
    pub fn pixel_at(&self, index: usize) -> [u8; 4] {
        let o = index * 4;
        [
            self.data[o],
            self.data[o + 1],
            self.data[o + 2],
            self.data[o + 3],
        ]
    }

    /// RGB colour at a linear pixel index
    #[must_use]
    pub fn color_at(&self, index: usize) -> ColorSample {
        let o = index * 4;
        ColorSample::new(self.data[o], self.data[o + 1], self.data[o + 2])
    }

    /// Overwrite the RGB channels at a linear pixel index, keeping alpha
    pub fn set_color_at(&mut self, index: usize, color: ColorSample) {
        let o = index * 4;
        self.data[o] = color.r;
        self.data[o + 1] = color.g;
        self.data[o + 2] = color.b;
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let o = self.index(x, y) * 4;
        self.data[o..o + 4].copy_from_slice(&rgba);
    }

    /// Iterate over the RGB colour of every pixel in row-major order
    pub fn colors(&self) -> impl Iterator<Item = ColorSample> + '_ {
        self.data
            .chunks_exact(4)
            .map(|px| ColorSample::new(px[0], px[1], px[2]))
    }

    /// New buffer with this buffer's RGB and the mask as alpha channel
    ///
    /// # Errors
    /// - `Processing` if the mask dimensions differ from the buffer's
    pub fn with_alpha(&self, mask: &AlphaMask) -> Result<RasterBuffer> {
        if mask.dimensions != self.dimensions() {
            return Err(BgRemovalError::processing(format!(
                "Image ({}x{}) and mask ({}x{}) dimensions do not match",
                self.width, self.height, mask.dimensions.0, mask.dimensions.1
            )));
        }
        let mut data = self.data.clone();
        for (px, &alpha) in data.chunks_exact_mut(4).zip(mask.data.iter()) {
            px[3] = alpha;
        }
        Ok(Self {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

/// Raw sRGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorSample {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Euclidean distance in RGB space
    #[must_use]
    pub fn rgb_distance(self, other: ColorSample) -> f32 {
        let dr = f32::from(self.r) - f32::from(other.r);
        let dg = f32::from(self.g) - f32::from(other.g);
        let db = f32::from(self.b) - f32::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Rec. 601 luma in 0-255
    #[must_use]
    pub fn luminance(self) -> f32 {
        0.299 * f32::from(self.r) + 0.587 * f32::from(self.g) + 0.114 * f32::from(self.b)
    }

    /// HSV saturation in [0,1]
    #[must_use]
    pub fn saturation(self) -> f32 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        if max == 0 {
            0.0
        } else {
            f32::from(max - min) / f32::from(max)
        }
    }
}

/// Colour in the perceptual L*a*b* space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabSample {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl LabSample {
    #[must_use]
    pub const fn new(l: f32, a: f32, b: f32) -> Self {
        Self { l, a, b }
    }

    #[must_use]
    pub fn distance_squared(self, other: LabSample) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl * dl + da * da + db * db
    }

    /// Euclidean (CIE76) colour difference
    #[must_use]
    pub fn distance(self, other: LabSample) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// Inclusive pixel bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl BoundingBox {
    /// Box containing a single pixel
    #[must_use]
    pub fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Number of pixels covered by the box
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.max_x - self.min_x + 1) * u64::from(self.max_y - self.min_y + 1)
    }
}

/// K-means cluster: colour centre plus spatial statistics of its members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub l: f32,
    pub a: f32,
    pub b: f32,
    pub member_count: usize,
    /// `None` while the cluster has no members
    pub bounding_box: Option<BoundingBox>,
    pub centroid_x: f32,
    pub centroid_y: f32,
}

impl ClusterCentroid {
    /// Unpopulated cluster seeded at a colour
    #[must_use]
    pub fn seeded(lab: LabSample) -> Self {
        Self {
            l: lab.l,
            a: lab.a,
            b: lab.b,
            member_count: 0,
            bounding_box: None,
            centroid_x: 0.0,
            centroid_y: 0.0,
        }
    }

    #[must_use]
    pub fn lab(&self) -> LabSample {
        LabSample::new(self.l, self.a, self.b)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.member_count == 0
    }
}

/// Cluster id per pixel, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<u8>,
}

impl LabelMap {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![0; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.labels[y as usize * self.width as usize + x as usize]
    }
}

/// Per-pixel opacity mask (0 = background, 255 = foreground)
///
/// Always has the dimensions of the image it was computed from; storing `u8`
/// keeps every value inside [0,255] after any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaMask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl AlphaMask {
    /// Create a new mask from raw values
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(vec![value; width as usize * height as usize], (width, height))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.dimensions.0 as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let w = self.dimensions.0 as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    /// Whether the pixel counts as foreground (alpha at least 128)
    #[must_use]
    pub fn is_opaque_at(&self, index: usize) -> bool {
        self.data[index] >= OPAQUE_CUTOFF
    }

    /// Convert mask to a grayscale image
    pub fn to_image(&self) -> Result<ImageBuffer<image::Luma<u8>, Vec<u8>>> {
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::surface_unavailable("Failed to create image from mask data")
        })
    }

    /// Save mask as PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let image = self.to_image()?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x >= OPAQUE_CUTOFF).count();
        let transparent_pixels = self.data.iter().filter(|&&x| x < 10).count();
        let ratio = |n: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                n as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio: ratio(foreground_pixels),
            transparent_ratio: ratio(transparent_pixels),
        }
    }
}

/// Alpha value from which a pixel is counted as foreground
pub const OPAQUE_CUTOFF: u8 = 128;

/// Statistics about an alpha mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    /// Share of pixels with alpha below 10
    pub transparent_ratio: f32,
}

/// Which route through the pipeline produced a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePath {
    /// Advanced path seeded from background colour distance
    ColorDistance,
    /// Advanced path seeded from K-means cluster membership
    Cluster,
    /// Threshold-only path taken after an algorithm failure
    Fallback,
}

impl std::fmt::Display for PipelinePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ColorDistance => write!(f, "color-distance"),
            Self::Cluster => write!(f, "cluster"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Per-stage timing breakdown in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub color_conversion_ms: u64,
    pub edge_detection_ms: u64,
    pub background_sampling_ms: u64,
    pub clustering_ms: u64,
    pub classification_ms: u64,
    pub mask_building_ms: u64,
    pub refinement_ms: u64,
    pub morphology_ms: u64,
    pub smoothing_ms: u64,
    /// Time spent in the fallback path, if it ran
    pub fallback_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Sum of all measured stages
    #[must_use]
    pub fn measured_ms(&self) -> u64 {
        self.color_conversion_ms
            + self.edge_detection_ms
            + self.background_sampling_ms
            + self.clustering_ms
            + self.classification_ms
            + self.mask_building_ms
            + self.refinement_ms
            + self.morphology_ms
            + self.smoothing_ms
            + self.fallback_ms
    }

    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Total: {}ms | Color: {}ms | Edges: {}ms | Sampling: {}ms | Clustering: {}ms | Mask: {}ms | Refine: {}ms | Morphology: {}ms | Smooth: {}ms",
            self.total_ms,
            self.color_conversion_ms,
            self.edge_detection_ms,
            self.background_sampling_ms,
            self.clustering_ms + self.classification_ms,
            self.mask_building_ms,
            self.refinement_ms,
            self.morphology_ms,
            self.smoothing_ms
        );
        if self.fallback_ms > 0 {
            summary.push_str(&format!(" | Fallback: {}ms", self.fallback_ms));
        }
        summary
    }
}

/// Diagnostics attached to every pipeline result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub processing_time_ms: u64,
    /// Heuristic decisiveness of the mask in [0,1]
    pub confidence: f32,
    /// Heuristic agreement of mask boundaries with image edges in [0,1]
    pub edge_quality: f32,
    pub path: PipelinePath,
    /// Error that moved processing onto the fallback path
    pub fallback_reason: Option<String>,
    pub foreground_ratio: f32,
    pub dimensions: (u32, u32),
    pub background_colors: Vec<ColorSample>,
    pub timestamp: DateTime<Utc>,
    pub timings: ProcessingTimings,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(path: PipelinePath, dimensions: (u32, u32)) -> Self {
        Self {
            processing_time_ms: 0,
            confidence: 0.0,
            edge_quality: 0.0,
            path,
            fallback_reason: None,
            foreground_ratio: 0.0,
            dimensions,
            background_colors: Vec::new(),
            timestamp: Utc::now(),
            timings: ProcessingTimings::default(),
        }
    }

    /// Pretty-printed JSON for diagnostics output
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BgRemovalError::internal(format!("Failed to serialize metadata: {}", e)))
    }
}

/// Complete output of one pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Source pixels with the computed mask as alpha channel
    pub output: RasterBuffer,
    pub mask: AlphaMask,
    /// Cluster assignment, present when the cluster path produced the mask
    pub label_map: Option<LabelMap>,
    pub metadata: ProcessingMetadata,
}

impl PipelineResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.output.dimensions()
    }

    /// Encode the output image in the requested format
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        OutputFormatHandler::encode(&self.output, format)
    }

    /// Save the output image, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<()> {
        ImageIOService::save_buffer(&self.output, path, format)
    }

    /// Save the output image as PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save(path, OutputFormat::Png)
    }

    /// Output image as a `DynamicImage`
    pub fn to_dynamic_image(&self) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgba8(self.output.to_rgba_image()?))
    }

    #[must_use]
    pub fn timing_summary(&self) -> String {
        self.metadata.timings.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_rejects_zero_dimensions() {
        let err = RasterBuffer::new(0, 10, Vec::new()).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidInput(_)));
        let err = RasterBuffer::filled(10, 0, [0, 0, 0, 255]).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidInput(_)));
    }

    #[test]
    fn test_raster_rejects_wrong_length() {
        let err = RasterBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidInput(_)));
    }

    #[test]
    fn test_raster_rejects_oversized_surface() {
        let err = RasterBuffer::filled(100_000, 100_000, [0; 4]).unwrap_err();
        assert!(matches!(err, BgRemovalError::SurfaceUnavailable(_)));
    }

    #[test]
    fn test_pixel_accessors() {
        let mut buffer = RasterBuffer::filled(3, 2, [10, 20, 30, 255]).unwrap();
        buffer.set_pixel(2, 1, [1, 2, 3, 4]);
        assert_eq!(buffer.pixel(2, 1), [1, 2, 3, 4]);
        assert_eq!(buffer.pixel_at(5), [1, 2, 3, 4]);
        assert_eq!(buffer.color_at(0), ColorSample::new(10, 20, 30));
        assert_eq!(buffer.colors().count(), 6);
    }

    #[test]
    fn test_with_alpha_leaves_source_untouched() {
        let source = RasterBuffer::filled(2, 2, [200, 100, 50, 255]).unwrap();
        let mask = AlphaMask::new(vec![0, 64, 128, 255], (2, 2));
        let output = source.with_alpha(&mask).unwrap();

        assert_eq!(output.pixel(1, 0), [200, 100, 50, 64]);
        assert_eq!(output.pixel(1, 1), [200, 100, 50, 255]);
        assert_eq!(source.pixel(0, 0)[3], 255);

        let wrong = AlphaMask::filled(3, 2, 0);
        assert!(source.with_alpha(&wrong).is_err());
    }

    #[test]
    fn test_rgba_image_round_trip() {
        let buffer = RasterBuffer::filled(4, 3, [1, 2, 3, 4]).unwrap();
        let image = buffer.to_rgba_image().unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        let back = RasterBuffer::from_rgba_image(image).unwrap();
        assert_eq!(back, buffer);
    }

    #[test]
    fn test_mask_statistics() {
        let mask = AlphaMask::new(vec![0, 5, 127, 128, 255, 255], (3, 2));
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 6);
        assert_eq!(stats.foreground_pixels, 3);
        assert_eq!(stats.background_pixels, 3);
        assert!((stats.foreground_ratio - 0.5).abs() < 1e-6);
        assert!((stats.transparent_ratio - 2.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounding_box_area() {
        let mut bbox = BoundingBox::at(5, 5);
        assert_eq!(bbox.area(), 1);
        bbox.include(2, 9);
        assert_eq!(bbox.area(), 4 * 5);
    }

    #[test]
    fn test_color_helpers() {
        let red = ColorSample::new(255, 0, 0);
        let gray = ColorSample::new(128, 128, 128);
        assert!((red.saturation() - 1.0).abs() < f32::EPSILON);
        assert!(gray.saturation().abs() < f32::EPSILON);
        assert!((ColorSample::new(0, 0, 0).rgb_distance(ColorSample::new(3, 4, 0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_metadata_serializes_path() {
        let metadata = ProcessingMetadata::new(PipelinePath::Fallback, (8, 8));
        let json = metadata.to_json().unwrap();
        assert!(json.contains("\"path\": \"fallback\""));
    }
}
