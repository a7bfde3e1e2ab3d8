//! Error types for registration operations.
//!
//! `TooFewSamples` is the one recoverable failure: it tells the stack
//! aligner that the fixed mask covers too much of the moving slice and should
//! be shrunk before trying again.

use histostack_core::transform::TransformError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Error in metric computation.
    #[error("Metric error: {0}")]
    MetricError(String),

    /// Too few fixed samples map inside the moving image and mask.
    #[error("Too few valid samples: {valid} mapped inside the moving image, {required} required")]
    TooFewSamples { valid: usize, required: usize },

    /// Error in optimizer operation.
    #[error("Optimizer error: {0}")]
    OptimizerError(String),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error in image validation.
    #[error("Image validation error: {0}")]
    ImageValidationError(String),

    /// Mask shrinking did not rescue a slice.
    #[error("Slice {slice} still failed after {attempts} mask shrinks")]
    RetriesExhausted { slice: usize, attempts: u32 },

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a metric error.
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::MetricError(msg.into())
    }

    /// Create an optimizer error.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::OptimizerError(msg.into())
    }

    /// Create an image validation error.
    pub fn image_validation(msg: impl Into<String>) -> Self {
        Self::ImageValidationError(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn too_few_samples(valid: usize, required: usize) -> Self {
        Self::TooFewSamples { valid, required }
    }

    /// True for the failure a smaller fixed mask can fix.
    pub fn needs_smaller_mask(&self) -> bool {
        matches!(self, Self::TooFewSamples { .. })
    }
}
