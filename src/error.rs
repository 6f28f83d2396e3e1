//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Comprehensive error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Undecodable or zero-dimension input image
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No pixel buffer could be obtained for the image
    #[error("Pixel surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// Failure inside the clustering/refinement path, recovered by the fallback path
    #[error("Algorithm failure: {0}")]
    AlgorithmFailure(String),

    /// Processing was cancelled at a stage boundary
    #[error("Processing cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Every attempt of an attempt chain failed
    #[error("All removal attempts failed: {}", .0.join("; "))]
    AllAttemptsFailed(Vec<String>),

    /// Memory allocation or processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new surface unavailable error
    pub fn surface_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SurfaceUnavailable(msg.into())
    }

    /// Create a new algorithm failure
    pub fn algorithm_failure<S: Into<String>>(msg: S) -> Self {
        Self::AlgorithmFailure(msg.into())
    }

    /// Create a cancellation error for the stage that was about to run
    pub fn cancelled<S: Into<String>>(stage: S) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the processor may recover from this error by switching to the fallback path
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlgorithmFailure(_))
    }

    /// Whether this error reports a cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    // Enhanced contextual error creators

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = BgRemovalError::invalid_input("zero width");
        assert!(matches!(err, BgRemovalError::InvalidInput(_)));

        let err = BgRemovalError::unsupported_format("TIFF");
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));

        let err = BgRemovalError::cancelled("clustering");
        assert!(err.is_cancelled());
        assert_eq!(
            err.to_string(),
            "Processing cancelled before stage 'clustering'"
        );
    }

    #[test]
    fn test_only_algorithm_failure_is_recoverable() {
        assert!(BgRemovalError::algorithm_failure("empty cluster").is_recoverable());
        assert!(!BgRemovalError::invalid_input("empty").is_recoverable());
        assert!(!BgRemovalError::surface_unavailable("no buffer").is_recoverable());
        assert!(!BgRemovalError::cancelled("smoothing").is_recoverable());
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BgRemovalError::file_io_error("read image", Path::new("/tmp/in.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read image"));
        assert!(error_string.contains("/tmp/in.png"));

        let err = BgRemovalError::config_value_error("edge smoothing", 9, "0-5", Some(2));
        let error_string = err.to_string();
        assert!(error_string.contains("edge smoothing"));
        assert!(error_string.contains('9'));
        assert!(error_string.contains("0-5"));
        assert!(error_string.contains("Recommended: 2"));

        let err = BgRemovalError::processing_stage_error(
            "edge detection",
            "buffer too small",
            Some("3x3 RGBA"),
        );
        let error_string = err.to_string();
        assert!(error_string.contains("edge detection"));
        assert!(error_string.contains("3x3 RGBA"));
    }

    #[test]
    fn test_all_attempts_failed_display() {
        let err = BgRemovalError::AllAttemptsFailed(vec![
            "remote: timeout".to_string(),
            "local: invalid input".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "All removal attempts failed: remote: timeout; local: invalid input"
        );
    }
}
