//! Foreground cluster selection
//!
//! Subjects tend to be moderately sized, centred and compact; sprawling,
//! off-centre or tiny clusters are more likely background or noise. Clusters
//! whose colour matches a sampled background colour are never chosen.

use crate::error::{BgRemovalError, Result};
use crate::models::ModelProfile;
use crate::stages::background::BackgroundColor;
use crate::types::ClusterCentroid;

pub const MAX_FOREGROUND_CLUSTERS: usize = 4;

const SIZE_WEIGHT: f32 = 0.3;
const CENTER_WEIGHT: f32 = 0.4;
const COMPACTNESS_WEIGHT: f32 = 0.3;
const MIN_SIZE_RATIO: f32 = 0.05;
const MAX_SIZE_RATIO: f32 = 0.7;

/// Score terms for one cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterScore {
    pub cluster: usize,
    pub size_ratio: f32,
    pub center_score: f32,
    pub compactness: f32,
    /// Weighted composite in [0,1]
    pub score: f32,
    /// Centroid colour lies within the model threshold of a background colour
    pub matches_background: bool,
}

/// Clusters chosen as foreground plus per-cluster foreground likelihood
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundSelection {
    /// Selected cluster ids, best first
    pub foreground: Vec<usize>,
    pub scores: Vec<ClusterScore>,
    /// Indexed by cluster id; 0 for empty or background-coloured clusters
    pub likelihood: Vec<f32>,
}

impl ForegroundSelection {
    #[must_use]
    pub fn is_foreground(&self, cluster: usize) -> bool {
        self.foreground.contains(&cluster)
    }
}

/// Number of clusters taken as foreground for `k` clusters
#[must_use]
pub fn foreground_cluster_count(k: usize) -> usize {
    k.div_ceil(3).min(MAX_FOREGROUND_CLUSTERS)
}

/// Score a single populated cluster
///
/// The composite is `0.3*[size in (0.05, 0.7)] + 0.4*centre + 0.3*compactness`
/// with each term scaled by the profile's weights and renormalised to [0,1].
#[must_use]
pub fn score_cluster(
    cluster: usize,
    centroid: &ClusterCentroid,
    width: u32,
    height: u32,
    profile: &ModelProfile,
) -> ClusterScore {
    let total = (width as f32 * height as f32).max(1.0);
    let size_ratio = centroid.member_count as f32 / total;

    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let max_distance = (cx * cx + cy * cy).sqrt().max(f32::EPSILON);
    let dx = centroid.centroid_x + 0.5 - cx;
    let dy = centroid.centroid_y + 0.5 - cy;
    let center_score = (1.0 - (dx * dx + dy * dy).sqrt() / max_distance).clamp(0.0, 1.0);

    let compactness = centroid.bounding_box.map_or(0.0, |bbox| {
        (centroid.member_count as f32 / bbox.area() as f32).min(1.0)
    });

    let size_term = if size_ratio > MIN_SIZE_RATIO && size_ratio < MAX_SIZE_RATIO {
        1.0
    } else {
        0.0
    };

    let w = profile.cluster_weights;
    let weighted = SIZE_WEIGHT * w.foreground * size_term
        + CENTER_WEIGHT * w.center * center_score
        + COMPACTNESS_WEIGHT * w.edge * compactness;
    let norm = SIZE_WEIGHT * w.foreground + CENTER_WEIGHT * w.center + COMPACTNESS_WEIGHT * w.edge;

    ClusterScore {
        cluster,
        size_ratio,
        center_score,
        compactness,
        score: (weighted / norm).clamp(0.0, 1.0),
        matches_background: false,
    }
}

/// Choose the foreground clusters
///
/// # Errors
/// - `AlgorithmFailure` if fewer than two clusters are populated, no cluster
///   survives the background veto, or a score is not finite
pub fn classify_clusters(
    centroids: &[ClusterCentroid],
    width: u32,
    height: u32,
    profile: &ModelProfile,
    background: &[BackgroundColor],
) -> Result<ForegroundSelection> {
    let populated = centroids.iter().filter(|c| !c.is_empty()).count();
    if populated < 2 {
        return Err(BgRemovalError::algorithm_failure(format!(
            "degenerate clustering: {} of {} clusters populated",
            populated,
            centroids.len()
        )));
    }

    let mut scores: Vec<ClusterScore> = Vec::with_capacity(populated);
    for (k, centroid) in centroids.iter().enumerate() {
        if centroid.is_empty() {
            continue;
        }
        let mut score = score_cluster(k, centroid, width, height, profile);
        if !score.score.is_finite() {
            return Err(BgRemovalError::algorithm_failure(format!(
                "non-finite score for cluster {}",
                k
            )));
        }
        score.matches_background = background
            .iter()
            .any(|bg| bg.lab.distance(centroid.lab()) < profile.distance_threshold);
        scores.push(score);
    }

    let mut ranked: Vec<&ClusterScore> = scores.iter().filter(|s| !s.matches_background).collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.cluster.cmp(&b.cluster)));
    let foreground: Vec<usize> = ranked
        .iter()
        .take(foreground_cluster_count(centroids.len()))
        .map(|s| s.cluster)
        .collect();

    if foreground.is_empty() {
        return Err(BgRemovalError::algorithm_failure(
            "every populated cluster matches the background",
        ));
    }

    let mut likelihood = vec![0.0; centroids.len()];
    for s in &scores {
        if !s.matches_background {
            likelihood[s.cluster] = s.score;
        }
    }

    Ok(ForegroundSelection {
        foreground,
        scores,
        likelihood,
    })
}
