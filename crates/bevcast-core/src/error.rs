//! Error types for the temporal prediction engine.
//!
//! Every failure in this workspace is a wiring or configuration defect
//! surfaced to the caller; nothing here is transient or retried.

use thiserror::Error;

/// Main error type for bevcast operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BevError {
    /// Invalid configuration (rejected at construction time).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A selector string that names no known variant.
    #[error("Unknown {kind} '{value}', expected one of: {expected}")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Axis-level mismatch (e.g. channel width against the configured size).
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for bevcast operations.
pub type Result<T> = std::result::Result<T, BevError>;

impl BevError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create an unknown selector error.
    pub fn unknown_variant(
        kind: &'static str,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
            expected,
        }
    }

    /// Whether this error was raised while validating a configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_) | Self::UnknownVariant { .. }
        )
    }
}
