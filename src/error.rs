//! Error types for batch-export
//!
//! This module provides the error taxonomy of the export pipeline:
//! - [`SourceError`] for page/query fetch failures (carries the position reached)
//! - [`SinkError`] for object-store and filesystem write failures (carries the batch/key)
//! - [`ConfigError`] for malformed configuration, raised before any run starts
//!
//! A source or sink error aborts only the table run it occurred in; the
//! [`Exporter`](crate::exporter::Exporter) keeps going with the remaining tables.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SourcePosition;

/// Result type alias for batch-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for batch-export
#[derive(Debug, Error)]
pub enum Error {
    /// Reading from the record source failed
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Persisting a batch or stream failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The run was cancelled by the caller before the source was exhausted
    #[error("export cancelled at {position}")]
    Cancelled {
        /// How far the source had been read when the run stopped
        position: SourcePosition,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Source(SourceError::SizeQuery { .. }) => "size_query_failed",
            Error::Source(SourceError::Fetch { .. }) => "source_fetch_failed",
            Error::Source(SourceError::Malformed { .. }) => "source_malformed",
            Error::Sink(SinkError::Upload { .. }) => "upload_failed",
            Error::Sink(SinkError::Stream { .. }) => "stream_upload_failed",
            Error::Sink(SinkError::LocalWrite { .. }) => "local_write_failed",
            Error::Sink(SinkError::Encode { .. }) => "encode_failed",
            Error::Sink(SinkError::WorkerStopped { .. }) => "sink_worker_stopped",
            Error::Config(_) => "config_error",
            Error::Cancelled { .. } => "cancelled",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Batch number the failure refers to, if it happened while flushing a batch
    pub fn batch_number(&self) -> Option<u64> {
        match self {
            Error::Sink(e) => e.batch_number(),
            _ => None,
        }
    }
}

/// Failures raised by a [`RecordSource`](crate::source::RecordSource)
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The up-front size/page-count query failed, nothing was read
    #[error("size query failed: {reason}")]
    SizeQuery {
        /// The underlying failure
        reason: String,
    },

    /// Fetching the next page or row failed
    #[error("fetch failed at {position}: {reason}")]
    Fetch {
        /// Position reached when the fetch failed
        position: SourcePosition,
        /// The underlying failure
        reason: String,
    },

    /// The source returned data that could not be turned into records
    #[error("malformed data at {position}: {reason}")]
    Malformed {
        /// Position reached when the bad data was seen
        position: SourcePosition,
        /// What was wrong with it
        reason: String,
    },
}

impl SourceError {
    /// Position reached before the failure (zero for size query failures)
    pub fn position(&self) -> SourcePosition {
        match self {
            SourceError::SizeQuery { .. } => SourcePosition::default(),
            SourceError::Fetch { position, .. } | SourceError::Malformed { position, .. } => {
                *position
            }
        }
    }
}

/// Failures raised by a [`SinkStrategy`](crate::sink::SinkStrategy)
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// A discrete batch upload failed
    #[error("upload of batch {batch} to {key} failed: {reason}")]
    Upload {
        /// The batch number that could not be written
        batch: u64,
        /// Object key of the failed upload
        key: String,
        /// The underlying failure
        reason: String,
    },

    /// Writing to or completing a streamed object failed
    #[error("streamed upload to {key} failed: {reason}")]
    Stream {
        /// Object key of the streamed upload
        key: String,
        /// The underlying failure
        reason: String,
    },

    /// Writing the local output file failed
    #[error("write to {path} failed: {reason}")]
    LocalWrite {
        /// Path of the local output file
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// Records of a batch could not be encoded
    #[error("encoding batch {batch} failed: {reason}")]
    Encode {
        /// The batch number being encoded
        batch: u64,
        /// The underlying failure
        reason: String,
    },

    /// The sink worker went away without acknowledging
    #[error("sink worker stopped: {reason}")]
    WorkerStopped {
        /// Why the worker is gone
        reason: String,
    },
}

impl SinkError {
    /// Batch number the failure refers to, if any
    pub fn batch_number(&self) -> Option<u64> {
        match self {
            SinkError::Upload { batch, .. } | SinkError::Encode { batch, .. } => Some(*batch),
            _ => None,
        }
    }
}

/// Configuration error with context about which setting is invalid
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    /// Human-readable error message describing the configuration issue
    pub message: String,
    /// The configuration key that caused the error (e.g., "tables[2].name")
    pub key: Option<String>,
}

impl ConfigError {
    /// Create a config error pointing at a specific key
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
