//! Error types for SEG-Y creation

use crate::types::VolumeShape;
use thiserror::Error;

/// Main error type for SEG-Y operations
#[derive(Error, Debug)]
pub enum SegyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("the input shape {actual} does not match the declared dimensions {expected}")]
    ShapeMismatch {
        expected: VolumeShape,
        actual: VolumeShape,
    },

    #[error("Unsupported data format code: {0} (supported: 1 = IBM float, 5 = IEEE float)")]
    UnsupportedFormat(u16),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid writer state: {0}")]
    InvalidState(String),

    #[error("Encoding task failed: {0}")]
    Task(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SegyError {
    /// True for errors raised before any output byte is produced
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SegyError::Configuration(_)
                | SegyError::InvalidDimensions(_)
                | SegyError::ShapeMismatch { .. }
                | SegyError::UnsupportedFormat(_)
        )
    }
}

/// Specialized Result type for SEG-Y operations
pub type Result<T> = std::result::Result<T, SegyError>;

impl From<serde_json::Error> for SegyError {
    fn from(err: serde_json::Error) -> Self {
        SegyError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SegyError {
    fn from(err: tokio::task::JoinError) -> Self {
        SegyError::Task(err.to_string())
    }
}
