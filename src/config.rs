//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Maximum supported edge smoothing level
pub const MAX_EDGE_SMOOTHING: u8 = 5;

/// Kind of subject the caller expects in the image; selects a tuning profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubjectModel {
    Person,
    Product,
    Animal,
    Car,
    Building,
    #[default]
    General,
}

impl SubjectModel {
    /// All subject models in declaration order
    pub const ALL: [SubjectModel; 6] = [
        Self::Person,
        Self::Product,
        Self::Animal,
        Self::Car,
        Self::Building,
        Self::General,
    ];
}

impl std::fmt::Display for SubjectModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "person"),
            Self::Product => write!(f, "product"),
            Self::Animal => write!(f, "animal"),
            Self::Car => write!(f, "car"),
            Self::Building => write!(f, "building"),
            Self::General => write!(f, "general"),
        }
    }
}

impl FromStr for SubjectModel {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" => Ok(Self::Person),
            "product" => Ok(Self::Product),
            "animal" => Ok(Self::Animal),
            "car" => Ok(Self::Car),
            "building" => Ok(Self::Building),
            "general" => Ok(Self::General),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown subject model '{}'. Expected one of: person, product, animal, car, building, general",
                other
            ))),
        }
    }
}

/// Speed/quality trade-off of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Colour-distance mask, one morphology iteration
    Fast,
    /// Cluster mask, two morphology iterations
    #[default]
    Balanced,
    /// Cluster mask, three morphology iterations
    Precise,
}

impl Precision {
    /// Number of erosion and dilation passes applied by the morphology cleaner
    #[must_use]
    pub fn morphology_iterations(self) -> usize {
        match self {
            Self::Fast => 1,
            Self::Balanced => 2,
            Self::Precise => 3,
        }
    }

    /// Whether the advanced path builds its initial mask from K-means clusters
    #[must_use]
    pub fn uses_clustering(self) -> bool {
        !matches!(self, Self::Fast)
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::Precise => write!(f, "precise"),
        }
    }
}

impl FromStr for Precision {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "precise" => Ok(Self::Precise),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown precision '{}'. Expected one of: fast, balanced, precise",
                other
            ))),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// Lossless WebP with alpha channel transparency
    WebP,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::WebP => write!(f, "webp"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            other => Err(BgRemovalError::unsupported_format(format!(
                "'{}' (expected png or webp)",
                other
            ))),
        }
    }
}

/// Options for a single pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Subject profile used for thresholds and classifier weights
    pub model: SubjectModel,

    /// Speed/quality trade-off
    pub precision: Precision,

    /// Number of boundary smoothing passes (0-5)
    pub edge_smoothing: u8,

    /// Encoded output format
    pub output_format: OutputFormat,

    /// Seed for background sampling and K-means initialization (None = entropy)
    pub seed: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            model: SubjectModel::default(),
            precision: Precision::default(),
            edge_smoothing: 2,
            output_format: OutputFormat::default(),
            seed: None,
        }
    }
}

impl PipelineOptions {
    /// Create a new options builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use offline_bgremove::{PipelineOptions, Precision, SubjectModel};
    ///
    /// let options = PipelineOptions::builder()
    ///     .model(SubjectModel::Product)
    ///     .precision(Precision::Precise)
    ///     .seed(7)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(options.seed, Some(7));
    /// ```
    #[must_use]
    pub fn builder() -> PipelineOptionsBuilder {
        PipelineOptionsBuilder::default()
    }

    /// Validate all option values
    ///
    /// # Errors
    /// - Edge smoothing level above 5
    pub fn validate(&self) -> Result<()> {
        if self.edge_smoothing > MAX_EDGE_SMOOTHING {
            return Err(BgRemovalError::config_value_error(
                "edge smoothing",
                self.edge_smoothing,
                "0-5",
                Some(2),
            ));
        }
        Ok(())
    }

    /// Parse and validate options from a JSON document
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("Invalid options JSON: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Load and validate options from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("read options file", path_ref, &e))?;
        Self::from_json_str(&content)
    }
}

/// Builder for `PipelineOptions`
#[derive(Debug, Default)]
pub struct PipelineOptionsBuilder {
    options: PipelineOptions,
}

impl PipelineOptionsBuilder {
    #[must_use]
    pub fn model(mut self, model: SubjectModel) -> Self {
        self.options.model = model;
        self
    }

    #[must_use]
    pub fn precision(mut self, precision: Precision) -> Self {
        self.options.precision = precision;
        self
    }

    /// Set the edge smoothing level, clamped to 0-5
    #[must_use]
    pub fn edge_smoothing(mut self, level: u8) -> Self {
        self.options.edge_smoothing = level.min(MAX_EDGE_SMOOTHING);
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.options.output_format = format;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = Some(seed);
        self
    }

    /// Build the options
    ///
    /// # Errors
    /// - Option validation failures
    pub fn build(self) -> Result<PipelineOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
