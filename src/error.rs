//! Error handling.

use arrow::error::ArrowError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tracing::{event, Level};

use crate::frequency::Frequency;

/// Ensemble summary error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant belongs to one [ErrorKind], see [SummaryError::kind].
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Error reading or writing Arrow data
    #[error("failed to read or write arrow data")]
    Arrow(#[from] ArrowError),

    /// Two providers combined as a delta disagree on resampling support
    #[error("delta providers must both support resampling or both be presampled")]
    DeltaResamplingMismatch,

    /// Requested output frequency is finer than the input frequency
    #[error("requested frequency {requested} is finer than the input frequency {input}")]
    FrequencyTooFine { requested: String, input: String },

    /// Error expanding a file glob pattern
    #[error("invalid file pattern {pattern}")]
    GlobPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Inconsistent vector metadata between two combined providers
    #[error("vector metadata for {vector_name} differs between the two providers")]
    InconsistentMetadata { vector_name: String },

    /// Malformed table data
    #[error("invalid table: {reason}")]
    InvalidTable { reason: String },

    /// Input/output error
    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error (de)serialising a manifest or metadata record
    #[error("failed to (de)serialise JSON")]
    Json(#[from] serde_json::Error),

    /// A derived vector name was expected but the prefix is missing
    #[error("{vector_name} is not a per interval or per day vector")]
    MissingDerivedPrefix { vector_name: String },

    /// No per-realization files matched the pattern
    #[error("no files found matching {pattern}")]
    NoInputFiles { pattern: String },

    /// Provider still missing in the backing store after it was written
    #[error("provider {storage_key} could not be read back after writing it to the backing store")]
    ProviderNotFoundAfterWrite { storage_key: String },

    /// Fixed-frequency provider asked for another frequency
    #[error("provider is sampled at {available} and cannot be resampled to {requested}")]
    ResamplingNotSupported {
        requested: Frequency,
        available: String,
    },

    /// Provider not present in the backing store and writes are disallowed
    #[error("provider {storage_key} not found in backing store and storage writes are disallowed")]
    StorageWritesDisallowed { storage_key: String },

    /// Requested vector does not exist in the provider or table
    #[error("unknown vector {vector_name}")]
    UnknownVector { vector_name: String },

    /// Unsupported frequency string
    #[error("unsupported frequency {frequency}")]
    UnsupportedFrequency { frequency: String },
}

impl SummaryError {
    /// Shorthand for an [SummaryError::Io] error on a path.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        SummaryError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Invalid request
            SummaryError::DeltaResamplingMismatch
            | SummaryError::FrequencyTooFine { .. }
            | SummaryError::InconsistentMetadata { .. }
            | SummaryError::InvalidTable { .. }
            | SummaryError::MissingDerivedPrefix { .. }
            | SummaryError::ResamplingNotSupported { .. }
            | SummaryError::UnknownVector { .. }
            | SummaryError::UnsupportedFrequency { .. } => ErrorKind::InvalidRequest,

            // Build or storage failure
            SummaryError::Arrow(_)
            | SummaryError::GlobPattern { .. }
            | SummaryError::Io { .. }
            | SummaryError::NoInputFiles { .. }
            | SummaryError::ProviderNotFoundAfterWrite { .. }
            | SummaryError::StorageWritesDisallowed { .. } => ErrorKind::Storage,

            // Internal error
            SummaryError::Json(_) => ErrorKind::Internal,
        }
    }
}

/// Error category.
///
/// Invalid requests are caller mistakes and are never logged here. Storage and internal errors
/// are fatal for the call that raised them.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request is invalid and must not be retried unchanged
    InvalidRequest,
    /// Building, reading or writing a backing store entry failed
    Storage,
    /// Unexpected internal failure
    Internal,
}

/// Serialisable description of an error and its causes
///
/// This is what a consumer shows instead of a partial result.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Error category
    pub kind: ErrorKind,

    /// Main error message
    pub message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Vec<String>>,
}

impl ErrorReport {
    /// Return a new ErrorReport
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    pub fn new(error: &SummaryError) -> Self {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorReport {
            kind: error.kind(),
            message,
            caused_by,
        }
    }
}

impl From<&SummaryError> for ErrorReport {
    /// Convert from a `SummaryError` into an `ErrorReport`, logging non-request errors.
    fn from(error: &SummaryError) -> Self {
        let report = ErrorReport::new(error);
        if report.kind != ErrorKind::InvalidRequest {
            event!(Level::ERROR, "{}", report.message);
            for cause in report.caused_by.iter().flatten() {
                event!(Level::ERROR, "Caused by: {}", cause);
            }
        }
        report
    }
}
