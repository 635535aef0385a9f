//! Error types for feature indexing and retrieval.

use thiserror::Error;

use crate::extent::Axis;

/// Result type alias using FeatureError.
pub type FeatureResult<T> = Result<T, FeatureError>;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Primary error type for indexing, caching and feature reads.
#[derive(Debug, Error)]
pub enum FeatureError {
    // === Query Errors ===
    #[error("Invalid {axis} range: low ({low}) is greater than high ({high})")]
    InvalidQueryRange {
        axis: Axis,
        low: String,
        high: String,
    },

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Invalid feature id: {0}")]
    InvalidFeatureId(String),

    // === Dataset Errors ===
    #[error("Invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("The location {0} doesn't refer to any existing files")]
    NoFiles(String),

    #[error("{message}")]
    DataReading {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    // === Index Errors ===
    #[error("Features have already been loaded into this index")]
    IndexSealed,

    #[error("Invalid index file: {0}")]
    IndexFormat(String),

    // === Infrastructure Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeatureError {
    /// Create a DataReading error wrapping the underlying cause.
    pub fn data_reading(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::DataReading {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a DataReading error with no underlying cause.
    pub fn data_reading_msg(message: impl Into<String>) -> Self {
        Self::DataReading {
            message: message.into(),
            source: None,
        }
    }

    /// Create an InvalidQueryRange error for the given axis.
    pub fn invalid_range(axis: Axis, low: impl ToString, high: impl ToString) -> Self {
        Self::InvalidQueryRange {
            axis,
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    /// Whether this error is a read failure (as opposed to a bad request).
    pub fn is_data_reading(&self) -> bool {
        matches!(self, FeatureError::DataReading { .. })
    }
}

impl From<std::io::Error> for FeatureError {
    fn from(err: std::io::Error) -> Self {
        FeatureError::data_reading("I/O error", err)
    }
}

impl From<serde_json::Error> for FeatureError {
    fn from(err: serde_json::Error) -> Self {
        FeatureError::data_reading("Malformed JSON record", err)
    }
}

impl From<bincode::Error> for FeatureError {
    fn from(err: bincode::Error) -> Self {
        FeatureError::IndexFormat(err.to_string())
    }
}
