//! Pipeline stages
//!
//! Each stage is a set of pure functions over borrowed inputs that return fresh
//! outputs. The [`SegmentationProcessor`](crate::processor::SegmentationProcessor)
//! threads them together and owns every intermediate buffer.

pub mod background;
pub mod classify;
pub mod color;
pub mod edges;
pub mod kmeans;
pub mod mask;
pub mod morphology;
pub mod refine;
pub mod smoothing;

pub use background::{sample_background, BackgroundColor};
pub use classify::{classify_clusters, ForegroundSelection};
pub use color::{convert_buffer, lab_to_srgb, srgb_to_lab, LabImage};
pub use edges::detect_edges;
pub use kmeans::{segment, Segmentation};
pub use mask::{cluster_mask, color_distance_mask, rgb_distance_mask, DistanceMask, MaskSeed};
pub use morphology::clean;
pub use refine::refine;
pub use smoothing::smooth_edges;
