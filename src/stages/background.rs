//! Background colour estimation from the image border
//!
//! Two sample pools are merged: random points from weighted corner boxes and
//! edge-centre strips, and a sparse grid of low-edge pixels near the border.
//! The pooled samples are reduced to at most [`MAX_BACKGROUND_COLORS`]
//! representative colours by an online nearest-centroid merge in L*a*b*.

use crate::stages::color::srgb_to_lab;
use crate::types::{ColorSample, EdgeMap, LabSample, RasterBuffer};
use rand::Rng;

pub const MAX_BACKGROUND_COLORS: usize = 5;

/// Perceptual distance under which a sample joins an existing cluster
pub const MERGE_DISTANCE: f32 = 20.0;

/// Random samples drawn per unit of region weight
pub const SAMPLES_PER_WEIGHT: usize = 8;

pub const GRID_STEP: usize = 5;

/// Edge strength below which a grid pixel counts as flat
pub const FLAT_EDGE_THRESHOLD: f32 = 30.0 / 255.0;

const CORNER_FRACTION: f32 = 0.15;
const STRIP_START: f32 = 0.35;
const STRIP_END: f32 = 0.65;
const STRIP_DEPTH: f32 = 0.10;
const BORDER_BAND: f32 = 0.20;

const CORNER_WEIGHT: usize = 3;
const STRIP_WEIGHT: usize = 2;

/// Representative background colour and the number of samples it absorbed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundColor {
    pub color: ColorSample,
    pub lab: LabSample,
    pub count: usize,
}

/// Half-open pixel rectangle with a sampling weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRegion {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub weight: usize,
}

fn span(len: u32, start: f32, end: f32) -> (u32, u32) {
    let lo = (len as f32 * start).floor() as u32;
    let hi = ((len as f32 * end).ceil() as u32).max(lo + 1).min(len);
    (lo.min(len - 1), hi)
}

fn depth(len: u32, fraction: f32) -> u32 {
    ((len as f32 * fraction).ceil() as u32).clamp(1, len)
}

/// Corner boxes and edge-centre strips for a `width` x `height` image
#[must_use]
pub fn sampling_regions(width: u32, height: u32) -> Vec<SampleRegion> {
    let cw = depth(width, CORNER_FRACTION);
    let ch = depth(height, CORNER_FRACTION);
    let sw = depth(width, STRIP_DEPTH);
    let sh = depth(height, STRIP_DEPTH);
    let (hx0, hx1) = span(width, STRIP_START, STRIP_END);
    let (vy0, vy1) = span(height, STRIP_START, STRIP_END);

    let region = |x0, y0, x1, y1, weight| SampleRegion {
        x0,
        y0,
        x1,
        y1,
        weight,
    };

    vec![
        region(0, 0, cw, ch, CORNER_WEIGHT),
        region(width - cw, 0, width, ch, CORNER_WEIGHT),
        region(0, height - ch, cw, height, CORNER_WEIGHT),
        region(width - cw, height - ch, width, height, CORNER_WEIGHT),
        region(hx0, 0, hx1, sh, STRIP_WEIGHT),
        region(hx0, height - sh, hx1, height, STRIP_WEIGHT),
        region(0, vy0, sw, vy1, STRIP_WEIGHT),
        region(width - sw, vy0, width, vy1, STRIP_WEIGHT),
    ]
}

fn in_border_band(x: u32, y: u32, width: u32, height: u32) -> bool {
    let bx = (width as f32 * BORDER_BAND) as u32;
    let by = (height as f32 * BORDER_BAND) as u32;
    x < bx || y < by || x >= width - bx || y >= height - by
}

/// Collect raw background samples from both pools
pub fn collect_samples<R: Rng + ?Sized>(
    buffer: &RasterBuffer,
    edges: &EdgeMap,
    rng: &mut R,
) -> Vec<ColorSample> {
    let (width, height) = buffer.dimensions();
    let mut samples = Vec::new();

    for region in sampling_regions(width, height) {
        for _ in 0..SAMPLES_PER_WEIGHT * region.weight {
            let x = rng.gen_range(region.x0..region.x1);
            let y = rng.gen_range(region.y0..region.y1);
            samples.push(buffer.color_at(buffer.index(x, y)));
        }
    }

    for y in (0..height).step_by(GRID_STEP) {
        for x in (0..width).step_by(GRID_STEP) {
            if edges[[y as usize, x as usize]] < FLAT_EDGE_THRESHOLD
                && in_border_band(x, y, width, height)
            {
                samples.push(buffer.color_at(buffer.index(x, y)));
            }
        }
    }

    samples
}

#[derive(Debug)]
struct SampleCluster {
    lab: LabSample,
    sum: [u64; 3],
    count: usize,
}

impl SampleCluster {
    fn new(color: ColorSample, lab: LabSample) -> Self {
        Self {
            lab,
            sum: [u64::from(color.r), u64::from(color.g), u64::from(color.b)],
            count: 1,
        }
    }

    fn absorb(&mut self, color: ColorSample, lab: LabSample) {
        self.count += 1;
        let n = self.count as f32;
        self.lab.l += (lab.l - self.lab.l) / n;
        self.lab.a += (lab.a - self.lab.a) / n;
        self.lab.b += (lab.b - self.lab.b) / n;
        self.sum[0] += u64::from(color.r);
        self.sum[1] += u64::from(color.g);
        self.sum[2] += u64::from(color.b);
    }

    fn mean_color(&self) -> ColorSample {
        let n = self.count as u64;
        let mean = |s: u64| ((s + n / 2) / n) as u8;
        ColorSample::new(mean(self.sum[0]), mean(self.sum[1]), mean(self.sum[2]))
    }
}

/// Merge samples into at most [`MAX_BACKGROUND_COLORS`] clusters, largest first
#[must_use]
pub fn cluster_samples(samples: &[ColorSample]) -> Vec<BackgroundColor> {
    let mut clusters: Vec<SampleCluster> = Vec::new();

    for &color in samples {
        let lab = srgb_to_lab(color);
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.lab.distance(lab)))
            .filter(|&(_, d)| d < MERGE_DISTANCE)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((i, _)) => clusters[i].absorb(color, lab),
            None => clusters.push(SampleCluster::new(color, lab)),
        }
    }

    // stable sort keeps first-seen order among equal counts
    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    clusters
        .into_iter()
        .take(MAX_BACKGROUND_COLORS)
        .map(|c| BackgroundColor {
            color: c.mean_color(),
            lab: c.lab,
            count: c.count,
        })
        .collect()
}

/// Estimate the representative background colours of an image
pub fn sample_background<R: Rng + ?Sized>(
    buffer: &RasterBuffer,
    edges: &EdgeMap,
    rng: &mut R,
) -> Vec<BackgroundColor> {
    let samples = collect_samples(buffer, edges, rng);
    let colors = cluster_samples(&samples);
    log::debug!(
        "Background sampling: {} samples reduced to {} colors",
        samples.len(),
        colors.len()
    );
    colors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::edges::detect_edges;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_regions_stay_inside_image() {
        for (w, h) in [(1, 1), (2, 3), (7, 5), (100, 100), (640, 480)] {
            let regions = sampling_regions(w, h);
            assert_eq!(regions.len(), 8);
            for r in regions {
                assert!(r.x0 < r.x1 && r.x1 <= w, "{:?} in {}x{}", r, w, h);
                assert!(r.y0 < r.y1 && r.y1 <= h, "{:?} in {}x{}", r, w, h);
            }
        }
    }

    #[test]
    fn test_corner_and_strip_weights() {
        let regions = sampling_regions(100, 100);
        assert_eq!(regions.iter().filter(|r| r.weight == 3).count(), 4);
        assert_eq!(regions.iter().filter(|r| r.weight == 2).count(), 4);
        assert_eq!(regions[0].x1, 15);
        assert_eq!(regions[0].y1, 15);
    }

    #[test]
    fn test_close_samples_merge() {
        let samples = [
            ColorSample::new(250, 250, 250),
            ColorSample::new(255, 255, 255),
            ColorSample::new(252, 252, 252),
            ColorSample::new(0, 0, 255),
        ];
        let colors = cluster_samples(&samples);
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].count, 3);
        assert_eq!(colors[0].color, ColorSample::new(252, 252, 252));
        assert_eq!(colors[1].color, ColorSample::new(0, 0, 255));
    }

    #[test]
    fn test_at_most_five_colors_sorted_by_count() {
        let mut samples = Vec::new();
        let palette = [
            (255, 0, 0),
            (0, 255, 0),
            (0, 0, 255),
            (255, 255, 0),
            (0, 0, 0),
            (255, 255, 255),
            (255, 0, 255),
        ];
        for (i, &(r, g, b)) in palette.iter().enumerate() {
            for _ in 0..=i {
                samples.push(ColorSample::new(r, g, b));
            }
        }
        let colors = cluster_samples(&samples);
        assert_eq!(colors.len(), MAX_BACKGROUND_COLORS);
        assert!(colors.windows(2).all(|w| w[0].count >= w[1].count));
        assert_eq!(colors[0].color, ColorSample::new(255, 0, 255));
    }

    #[test]
    fn test_centered_subject_is_not_sampled() {
        let mut buffer = RasterBuffer::filled(100, 100, [255, 255, 255, 255]).unwrap();
        for y in 30..70 {
            for x in 30..70 {
                buffer.set_pixel(x, y, [255, 0, 0, 255]);
            }
        }
        let edges = detect_edges(&buffer);
        let mut rng = StdRng::seed_from_u64(11);
        let colors = sample_background(&buffer, &edges, &mut rng);
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].color, ColorSample::new(255, 255, 255));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let mut buffer = RasterBuffer::filled(40, 30, [10, 20, 30, 255]).unwrap();
        for x in 0..40 {
            buffer.set_pixel(x, 0, [200, (x * 5) as u8, 40, 255]);
        }
        let edges = detect_edges(&buffer);
        let a = collect_samples(&buffer, &edges, &mut StdRng::seed_from_u64(3));
        let b = collect_samples(&buffer, &edges, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }
}
