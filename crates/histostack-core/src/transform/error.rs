//! Errors raised by the transform algebra.

use thiserror::Error;

/// Failure of a transform operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("matrix is singular and cannot be inverted")]
    Singular,

    #[error("square root undefined: determinant {det}, trace {trace}")]
    SquareRootDomain { det: f64, trace: f64 },

    #[error("result of {operation} cannot be represented as {kind}")]
    NotRepresentable { kind: String, operation: String },

    #[error("expected {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    #[error("unknown transform type: {0}")]
    UnknownType(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl TransformError {
    pub(crate) fn not_representable(kind: impl ToString, operation: impl Into<String>) -> Self {
        Self::NotRepresentable {
            kind: kind.to_string(),
            operation: operation.into(),
        }
    }

    pub(crate) fn check_count(expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::ParameterCount { expected, actual })
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
