//! Error types for ilsvrc-eval operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ilsvrc-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running an evaluation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required command-line flag was not supplied.
    #[error("Missing required flag: --{0}")]
    MissingFlag(&'static str),

    /// A flag was supplied with a value that could not be parsed.
    #[error("Invalid value for --{flag}: {value:?} ({reason})")]
    InvalidFlag {
        /// Flag name without leading dashes.
        flag: &'static str,
        /// Raw value supplied.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Delegate name not in the supported set.
    #[error("Unknown delegate: {0:?} (expected one of nnapi, gpu, hexagon, xnnpack)")]
    UnknownDelegate(String),

    /// The runtime cannot apply a requested delegate.
    #[error("Delegate unavailable ({delegate}): {reason}")]
    DelegateUnavailable {
        /// Delegate name.
        delegate: String,
        /// Reason reported by the runtime.
        reason: String,
    },

    /// Inconsistent or out-of-range configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error in ground-truth dataset discovery or parsing.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Number of ground-truth labels differs from the number of images.
    #[error("Ground truth label count ({labels}) does not match image count ({images})")]
    LabelCountMismatch {
        /// Labels read from the ground-truth label file.
        labels: usize,
        /// Images discovered in the ground-truth directory.
        images: usize,
    },

    /// Ground-truth label missing from the model output labels.
    #[error("Label {0:?} not found in model output labels")]
    UnknownLabel(String),

    /// Failed to load an image file.
    #[error("Image load failed: {path}: {reason}")]
    ImageLoad {
        /// Path to the image that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Error reported by the interpreter during creation or invocation.
    #[error("Interpreter error: {0}")]
    Interpreter(String),

    /// Model output size does not match the number of model labels.
    #[error("Output size mismatch: expected {expected} scores, got {actual}")]
    OutputSizeMismatch {
        /// Number of model output labels.
        expected: usize,
        /// Number of scores produced.
        actual: usize,
    },

    /// One or more shards failed.
    #[error("Shard {shard_id} failed: {source}")]
    Shard {
        /// Failing shard.
        shard_id: u64,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Error writing report files.
    #[error("Report error: {0}")]
    Report(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
