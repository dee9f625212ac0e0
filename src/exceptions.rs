//! ## Custom Errors for the Trip Percentile Filter
//!
//! This module defines the error type returned by every stage of the filter.
//! It uses the `thiserror` crate to derive the `Error` trait.
//! The `TripFilterError` enum has one variant per failure kind a caller may want to tell apart
//! (bad schema, empty input, unreachable source, unwritable destination), plus wrappers for
//! the errors raised by the underlying engine and file format crates.
//!
//! The `TripFilterResult` type alias simplifies error handling by providing a convenient
//! alias for results returned by the library.
//!
//! ### Example
//!
//! ```rust
//! use trip_percentile_filter::exceptions::{ErrorKind, TripFilterError, TripFilterResult};
//!
//! fn load_data() -> TripFilterResult<()> {
//!     Err(TripFilterError::EmptyDataset("trips.parquet".into()))
//! }
//!
//! assert_eq!(load_data().unwrap_err().kind(), ErrorKind::EmptyDataset);
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Errors specific to the trip percentile filter.
#[derive(Debug, Error)]
pub enum TripFilterError {
    /// The distance column is missing or not numeric, or the output schema drifted from the input.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// The input has no rows (or no usable distance values), so the percentile is undefined.
    #[error("Empty dataset: '{0}' has no trip distance values to compute a percentile from")]
    EmptyDataset(String),

    /// The input could not be read or fetched.
    #[error("Source unavailable: '{reference}': {reason}")]
    SourceUnavailable { reference: String, reason: String },

    /// The output could not be written or committed under its final name.
    #[error("I/O error writing '{}': {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Indicates that an invalid parameter was provided (e.g., a percentile outside 1..=100).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Wraps I/O errors that are not tied to a known path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps errors from DataFusion.
    #[error("DataFusion error: {0}")]
    DataFusionError(#[from] datafusion::error::DataFusionError),

    /// Wraps errors from Arrow.
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Wraps errors from Parquet.
    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
}

/// Coarse classification of a [`TripFilterError`], suitable for exit codes and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    EmptyDataset,
    SourceUnavailable,
    Io,
    InvalidParameter,
    Engine,
}

impl TripFilterError {
    /// Returns the failure kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TripFilterError::SchemaError(_) => ErrorKind::Schema,
            TripFilterError::EmptyDataset(_) => ErrorKind::EmptyDataset,
            TripFilterError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            TripFilterError::IoError { .. } | TripFilterError::Io(_) => ErrorKind::Io,
            TripFilterError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            TripFilterError::DataFusionError(_)
            | TripFilterError::ArrowError(_)
            | TripFilterError::ParquetError(_) => ErrorKind::Engine,
        }
    }

    pub(crate) fn source_unavailable(reference: impl Into<String>, reason: impl ToString) -> Self {
        TripFilterError::SourceUnavailable {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TripFilterError::IoError {
            path: path.into(),
            source,
        }
    }
}

/// A convenient result type for trip filter operations.
pub type TripFilterResult<T> = std::result::Result<T, TripFilterError>;
