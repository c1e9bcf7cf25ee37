//! Error types for RoomScout.

use std::time::Duration;

/// Top-level error type for the ingestion core.
///
/// Classifier failures are absorbed by the fallback path and never reach
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Listing store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures talking to the external extraction/classification service.
///
/// Every variant is recoverable: the orchestrator treats all of them the
/// same way and substitutes the local fallback classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from classifier: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Pipeline-level errors. Per-batch service failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    #[error("At least one batch must be allowed in flight")]
    InvalidConcurrency,
}

/// Listing hand-off errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Listing store request failed: {0}")]
    Request(String),

    #[error("Listing store rejected listing (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Errors reading a transcript file from disk.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("Failed to read transcript {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
