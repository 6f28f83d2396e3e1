//! Lloyd's K-means over L*a*b* pixels with a fixed iteration budget

use crate::error::{BgRemovalError, Result};
use crate::stages::color::LabImage;
use crate::types::{BoundingBox, ClusterCentroid, LabSample, LabelMap};
use rand::Rng;

pub const CLUSTER_COUNT: usize = 8;
pub const ITERATIONS: usize = 10;

/// Output of the segmenter: per-pixel labels and the final centroids
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub labels: LabelMap,
    /// Always [`CLUSTER_COUNT`] entries; some may have no members
    pub centroids: Vec<ClusterCentroid>,
}

impl Segmentation {
    /// Number of clusters with at least one member
    #[must_use]
    pub fn populated_clusters(&self) -> usize {
        self.centroids.iter().filter(|c| !c.is_empty()).count()
    }
}

#[derive(Debug, Clone)]
struct Accumulator {
    lab: LabSample,
    sum_l: f64,
    sum_a: f64,
    sum_b: f64,
    sum_x: f64,
    sum_y: f64,
    count: usize,
    bbox: Option<BoundingBox>,
}

impl Accumulator {
    fn new(lab: LabSample) -> Self {
        Self {
            lab,
            sum_l: 0.0,
            sum_a: 0.0,
            sum_b: 0.0,
            sum_x: 0.0,
            sum_y: 0.0,
            count: 0,
            bbox: None,
        }
    }

    fn add_sample(&mut self, lab: LabSample, x: u32, y: u32) {
        self.sum_l += f64::from(lab.l);
        self.sum_a += f64::from(lab.a);
        self.sum_b += f64::from(lab.b);
        self.sum_x += f64::from(x);
        self.sum_y += f64::from(y);
        self.count += 1;
        match self.bbox.as_mut() {
            Some(bbox) => bbox.include(x, y),
            None => self.bbox = Some(BoundingBox::at(x, y)),
        }
    }

    /// Move the centre to the member mean; an empty cluster keeps its centre
    fn update_centroid(&mut self) {
        if self.count > 0 {
            let n = self.count as f64;
            self.lab = LabSample::new(
                (self.sum_l / n) as f32,
                (self.sum_a / n) as f32,
                (self.sum_b / n) as f32,
            );
        }
    }

    fn reset(&mut self) {
        let lab = self.lab;
        *self = Self::new(lab);
    }

    fn finish(&self) -> ClusterCentroid {
        let mut centroid = ClusterCentroid::seeded(self.lab);
        centroid.member_count = self.count;
        centroid.bounding_box = self.bbox;
        if self.count > 0 {
            let n = self.count as f64;
            centroid.centroid_x = (self.sum_x / n) as f32;
            centroid.centroid_y = (self.sum_y / n) as f32;
        }
        centroid
    }
}

/// Index of the nearest centre by squared distance; ties go to the lower index
fn nearest_center(centers: &[Accumulator], lab: LabSample) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = center.lab.distance_squared(lab);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

/// Cluster the image into [`CLUSTER_COUNT`] groups
///
/// Centres start at randomly chosen pixels. Each of the [`ITERATIONS`] rounds
/// assigns every pixel to its nearest centre and then recomputes the centres;
/// there is no early exit.
///
/// # Errors
/// - `AlgorithmFailure` for an empty image or if a centre becomes non-finite
pub fn segment<R: Rng + ?Sized>(image: &LabImage, rng: &mut R) -> Result<Segmentation> {
    let n = image.len();
    if n == 0 {
        return Err(BgRemovalError::algorithm_failure(
            "cannot cluster an image without pixels",
        ));
    }
    let width = image.width;

    let mut centers: Vec<Accumulator> = (0..CLUSTER_COUNT)
        .map(|_| Accumulator::new(image.pixels[rng.gen_range(0..n)]))
        .collect();
    let mut labels = LabelMap::new(image.width, image.height);

    for iteration in 0..ITERATIONS {
        centers.iter_mut().for_each(Accumulator::reset);

        for (i, &lab) in image.pixels.iter().enumerate() {
            let k = nearest_center(&centers, lab);
            labels.labels[i] = k as u8;
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            centers[k].add_sample(lab, x, y);
        }

        for center in &mut centers {
            center.update_centroid();
            if !(center.lab.l.is_finite() && center.lab.a.is_finite() && center.lab.b.is_finite())
            {
                return Err(BgRemovalError::algorithm_failure(format!(
                    "cluster centre diverged in iteration {}",
                    iteration + 1
                )));
            }
        }
    }

    let centroids: Vec<ClusterCentroid> = centers.iter().map(Accumulator::finish).collect();
    log::debug!(
        "K-means finished: {} of {} clusters populated",
        centroids.iter().filter(|c| !c.is_empty()).count(),
        CLUSTER_COUNT
    );

    Ok(Segmentation { labels, centroids })
}
