//! Per-subject tuning profiles
//!
//! Each [`SubjectModel`] maps to a static, read-only [`ModelProfile`] holding the
//! colour-distance cutoff used by the mask builder and the weights the
//! foreground classifier applies to its size, centrality and compactness terms.
//! These tables are the only data shared between concurrent invocations.

use crate::config::SubjectModel;
use serde::Serialize;

/// Relative weights applied to the classifier's score terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterWeights {
    /// Scales the size-ratio term
    pub foreground: f32,
    /// Scales the compactness term
    pub edge: f32,
    /// Scales the centrality term
    pub center: f32,
}

/// Static tuning for one subject model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelProfile {
    pub model: SubjectModel,
    /// Perceptual distance below which a pixel is treated as background
    pub distance_threshold: f32,
    pub cluster_weights: ClusterWeights,
}

const PERSON: ModelProfile = ModelProfile {
    model: SubjectModel::Person,
    distance_threshold: 18.0,
    cluster_weights: ClusterWeights {
        foreground: 1.0,
        edge: 0.9,
        center: 1.2,
    },
};

const PRODUCT: ModelProfile = ModelProfile {
    model: SubjectModel::Product,
    distance_threshold: 22.0,
    cluster_weights: ClusterWeights {
        foreground: 1.0,
        edge: 1.2,
        center: 1.1,
    },
};

const ANIMAL: ModelProfile = ModelProfile {
    model: SubjectModel::Animal,
    distance_threshold: 20.0,
    cluster_weights: ClusterWeights {
        foreground: 1.0,
        edge: 0.8,
        center: 1.0,
    },
};

const CAR: ModelProfile = ModelProfile {
    model: SubjectModel::Car,
    distance_threshold: 28.0,
    cluster_weights: ClusterWeights {
        foreground: 1.1,
        edge: 1.1,
        center: 0.9,
    },
};

const BUILDING: ModelProfile = ModelProfile {
    model: SubjectModel::Building,
    distance_threshold: 30.0,
    cluster_weights: ClusterWeights {
        foreground: 1.2,
        edge: 1.0,
        center: 0.7,
    },
};

const GENERAL: ModelProfile = ModelProfile {
    model: SubjectModel::General,
    distance_threshold: 25.0,
    cluster_weights: ClusterWeights {
        foreground: 1.0,
        edge: 1.0,
        center: 1.0,
    },
};

impl ModelProfile {
    /// Look up the static profile for a subject model
    #[must_use]
    pub fn for_model(model: SubjectModel) -> &'static ModelProfile {
        match model {
            SubjectModel::Person => &PERSON,
            SubjectModel::Product => &PRODUCT,
            SubjectModel::Animal => &ANIMAL,
            SubjectModel::Car => &CAR,
            SubjectModel::Building => &BUILDING,
            SubjectModel::General => &GENERAL,
        }
    }
}
