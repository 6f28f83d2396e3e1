//! Initial alpha mask construction
//!
//! Two strategies: distance to the sampled background colours with a
//! model-dependent falloff, or plain membership in the foreground clusters.

use crate::stages::background::BackgroundColor;
use crate::stages::classify::ForegroundSelection;
use crate::stages::color::LabImage;
use crate::stages::edges::luminance_plane;
use crate::types::{AlphaMask, ColorSample, EdgeMap, LabelMap, RasterBuffer};
use ndarray::Array2;

/// Falloff exponent for text-like or graphic content
pub const CONTENT_EXPONENT: f32 = 0.5;
/// Falloff exponent for everything else
pub const DEFAULT_EXPONENT: f32 = 1.2;
/// Lowest alpha an important-content pixel may receive
pub const CONTENT_ALPHA_FLOOR: u8 = 200;

/// Luma range in the 3x3 neighbourhood above which contrast counts as high
const CONTENT_CONTRAST: f32 = 40.0;
const CONTENT_EDGE: f32 = 0.3;

/// Approximate sRGB distance spanned by one L*a*b* unit for typical
/// background colours; converts the profile threshold for the fallback
pub const RGB_UNITS_PER_LAB_UNIT: f32 = 3.0;

const BOOST_MIN_SATURATION: f32 = 0.5;
const BOOST_FACTOR: f32 = 1.08;

/// Alpha mask plus the per-pixel foreground likelihood used for hole filling
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSeed {
    pub mask: AlphaMask,
    /// In [0,1], one entry per pixel
    pub likelihood: Vec<f32>,
}

/// Result of the colour-distance strategy
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMask {
    pub seed: MaskSeed,
    /// Copy of the source with saturation boost applied to preserved pixels
    pub working: RasterBuffer,
}

/// Alpha for a pixel at `distance` from the nearest background colour
#[must_use]
pub fn distance_alpha(distance: f32, threshold: f32, important: bool) -> u8 {
    if distance.is_nan() || distance >= threshold {
        return 255;
    }
    let ratio = (distance / threshold).max(0.0);
    let exponent = if important {
        CONTENT_EXPONENT
    } else {
        DEFAULT_EXPONENT
    };
    let alpha = (ratio.powf(exponent) * 255.0).floor().clamp(0.0, 255.0) as u8;
    if important {
        alpha.max(CONTENT_ALPHA_FLOOR)
    } else {
        alpha
    }
}

/// Push a saturated colour away from its grey mean
#[must_use]
pub fn boost_saturation(color: ColorSample) -> ColorSample {
    if color.saturation() <= BOOST_MIN_SATURATION {
        return color;
    }
    let mean = (f32::from(color.r) + f32::from(color.g) + f32::from(color.b)) / 3.0;
    let boost = |c: u8| {
        (mean + (f32::from(c) - mean) * BOOST_FACTOR)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    ColorSample::new(boost(color.r), boost(color.g), boost(color.b))
}

fn local_contrast(luma: &Array2<f32>, x: usize, y: usize) -> f32 {
    let (height, width) = luma.dim();
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            let v = luma[[ny, nx]];
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    hi - lo
}

fn build_distance_mask(
    buffer: &RasterBuffer,
    edges: &EdgeMap,
    threshold: f32,
    distance: impl Fn(usize) -> f32,
) -> DistanceMask {
    let (width, height) = buffer.dimensions();
    let luma = luminance_plane(buffer);
    let mut working = buffer.clone();
    let mut mask = AlphaMask::filled(width, height, 0);
    let mut likelihood = vec![0.0; buffer.pixel_count()];

    for y in 0..height as usize {
        for x in 0..width as usize {
            let i = y * width as usize + x;
            let d = distance(i);
            likelihood[i] = (d / threshold).clamp(0.0, 1.0);

            if d < threshold {
                let important =
                    edges[[y, x]] > CONTENT_EDGE && local_contrast(&luma, x, y) > CONTENT_CONTRAST;
                mask.data[i] = distance_alpha(d, threshold, important);
            } else {
                mask.data[i] = 255;
                working.set_color_at(i, boost_saturation(buffer.color_at(i)));
            }
        }
    }

    DistanceMask {
        seed: MaskSeed { mask, likelihood },
        working,
    }
}

/// Colour-distance strategy in L*a*b*
#[must_use]
pub fn color_distance_mask(
    buffer: &RasterBuffer,
    lab: &LabImage,
    edges: &EdgeMap,
    background: &[BackgroundColor],
    threshold: f32,
) -> DistanceMask {
    build_distance_mask(buffer, edges, threshold, |i| {
        background
            .iter()
            .map(|bg| bg.lab.distance(lab.pixels[i]))
            .fold(f32::INFINITY, f32::min)
    })
}

/// Colour-distance strategy on raw RGB, used by the fallback path
///
/// `threshold` is in L*a*b* units, the same value the advanced path uses.
#[must_use]
pub fn rgb_distance_mask(
    buffer: &RasterBuffer,
    edges: &EdgeMap,
    background: &[BackgroundColor],
    threshold: f32,
) -> DistanceMask {
    build_distance_mask(buffer, edges, threshold * RGB_UNITS_PER_LAB_UNIT, |i| {
        let color = buffer.color_at(i);
        background
            .iter()
            .map(|bg| bg.color.rgb_distance(color))
            .fold(f32::INFINITY, f32::min)
    })
}

/// Cluster strategy: opaque iff the pixel's cluster is foreground
#[must_use]
pub fn cluster_mask(labels: &LabelMap, selection: &ForegroundSelection) -> MaskSeed {
    let data = labels
        .labels
        .iter()
        .map(|&l| if selection.is_foreground(l as usize) { 255 } else { 0 })
        .collect();
    let likelihood = labels
        .labels
        .iter()
        .map(|&l| selection.likelihood.get(l as usize).copied().unwrap_or(0.0))
        .collect();
    MaskSeed {
        mask: AlphaMask::new(data, (labels.width, labels.height)),
        likelihood,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::color::{convert_buffer, srgb_to_lab};
    use crate::stages::edges::detect_edges;

    fn background(r: u8, g: u8, b: u8) -> Vec<BackgroundColor> {
        let color = ColorSample::new(r, g, b);
        vec![BackgroundColor {
            color,
            lab: srgb_to_lab(color),
            count: 1,
        }]
    }

    #[test]
    fn test_distance_alpha_falloff() {
        assert_eq!(distance_alpha(0.0, 25.0, false), 0);
        assert_eq!(distance_alpha(25.0, 25.0, false), 255);
        assert_eq!(distance_alpha(40.0, 25.0, false), 255);
        let half = distance_alpha(12.5, 25.0, false);
        assert_eq!(half, (0.5f32.powf(1.2) * 255.0).floor() as u8);
        // content keeps more opacity and never drops under the floor
        assert!(distance_alpha(12.5, 25.0, true) > half);
        assert_eq!(distance_alpha(0.0, 25.0, true), CONTENT_ALPHA_FLOOR);
    }

    #[test]
    fn test_boost_only_touches_saturated_colors() {
        assert_eq!(
            boost_saturation(ColorSample::new(128, 120, 125)),
            ColorSample::new(128, 120, 125)
        );
        let boosted = boost_saturation(ColorSample::new(200, 40, 40));
        assert!(boosted.r > 200);
        assert!(boosted.g < 40);
    }

    #[test]
    fn test_color_distance_mask_on_square() {
        let mut buffer = RasterBuffer::filled(20, 20, [255, 255, 255, 255]).unwrap();
        for y in 5..15 {
            for x in 5..15 {
                buffer.set_pixel(x, y, [200, 40, 40, 255]);
            }
        }
        let lab = convert_buffer(&buffer);
        let edges = detect_edges(&buffer);
        let result = color_distance_mask(&buffer, &lab, &edges, &background(255, 255, 255), 22.0);

        assert_eq!(result.seed.mask.get(0, 0), 0);
        assert_eq!(result.seed.mask.get(10, 10), 255);
        assert_eq!(result.seed.likelihood[0], 0.0);
        assert_eq!(result.seed.likelihood[10 * 20 + 10], 1.0);
        // boost lands in the working copy only
        assert!(result.working.pixel(10, 10)[0] > 200);
        assert_eq!(buffer.pixel(10, 10), [200, 40, 40, 255]);
        assert_eq!(result.working.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_rgb_distance_mask_uniform() {
        let buffer = RasterBuffer::filled(8, 8, [250, 250, 250, 255]).unwrap();
        let edges = detect_edges(&buffer);
        let result = rgb_distance_mask(&buffer, &edges, &background(250, 250, 250), 25.0);
        assert!(result.seed.mask.data.iter().all(|&a| a == 0));
    }

    #[test]
    fn test_rgb_threshold_matches_lab_scale() {
        // about 17 RGB units off the background falls inside a 25-unit threshold
        let buffer = RasterBuffer::filled(8, 8, [230, 238, 242, 255]).unwrap();
        let edges = detect_edges(&buffer);
        let result = rgb_distance_mask(&buffer, &edges, &background(245, 245, 245), 25.0);
        assert!(result.seed.mask.data.iter().all(|&a| a < 128));

        // a strongly coloured pixel is still kept
        let buffer = RasterBuffer::filled(8, 8, [200, 40, 40, 255]).unwrap();
        let edges = detect_edges(&buffer);
        let result = rgb_distance_mask(&buffer, &edges, &background(245, 245, 245), 25.0);
        assert!(result.seed.mask.data.iter().all(|&a| a == 255));
    }

    #[test]
    fn test_empty_background_keeps_everything() {
        let buffer = RasterBuffer::filled(4, 4, [10, 10, 10, 255]).unwrap();
        let edges = detect_edges(&buffer);
        let result = rgb_distance_mask(&buffer, &edges, &[], 25.0);
        assert!(result.seed.mask.data.iter().all(|&a| a == 255));
    }

    #[test]
    fn test_cluster_mask_membership() {
        let labels = LabelMap {
            width: 2,
            height: 2,
            labels: vec![0, 1, 2, 1],
        };
        let selection = ForegroundSelection {
            foreground: vec![1],
            scores: Vec::new(),
            likelihood: vec![0.0, 0.8, 0.3],
        };
        let seed = cluster_mask(&labels, &selection);
        assert_eq!(seed.mask.data, vec![0, 255, 0, 255]);
        assert_eq!(seed.likelihood, vec![0.0, 0.8, 0.3, 0.8]);
    }
}
