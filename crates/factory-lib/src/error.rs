//! Error types for the factory ML core
//!
//! Data-quality problems never surface here: the validator reports them as
//! `ValidationError` values. This enum covers structural and operational
//! failures (caller bugs, broken files, dead sessions) that must fail loudly.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type FactoryResult<T> = Result<T, FactoryError>;

/// Unified error type for the factory ML core.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The schema file is malformed or internally inconsistent.
    #[error("Invalid schema {path}: {detail}")]
    Schema {
        /// Path of the offending schema file.
        path: PathBuf,
        /// What is wrong with it.
        detail: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A CSV file could not be parsed.
    #[error("Failed to read dataset {path}: {detail}")]
    Dataset {
        /// Path of the CSV file.
        path: PathBuf,
        /// What went wrong while parsing.
        detail: String,
    },

    /// A schema column is missing from the CSV header row.
    #[error("Dataset {path} has no column named \"{column}\"")]
    MissingColumn {
        /// The schema column that could not be mapped.
        column: String,
        /// Path of the CSV file.
        path: PathBuf,
    },

    /// An ONNX model file could not be loaded into a session.
    #[error("Failed to load model {path}: {detail}")]
    ModelLoad {
        /// Path of the model file.
        path: PathBuf,
        /// Reason reported by the inference runtime.
        detail: String,
    },

    /// A loaded model produced output the engine cannot interpret.
    #[error("Unexpected model output: {detail}")]
    ModelOutput {
        /// What was missing or malformed.
        detail: String,
    },

    /// A record does not match the schema the transformer was built with.
    #[error("Record {record} does not match the bound schema: {detail}")]
    Shape {
        /// 0-based index of the offending record.
        record: usize,
        /// The mismatch.
        detail: String,
    },

    /// An override names a column the record does not have.
    #[error("Unknown column \"{column}\" in simulation overrides")]
    UnknownColumn {
        /// The unmatched column name.
        column: String,
    },

    /// A candidate prediction was requested but no candidate is loaded.
    #[error("No candidate model loaded; call set_candidate first")]
    NoCandidate,

    /// The engine was closed, or never held a live session.
    #[error("Inference engine has no live session")]
    EngineClosed,

    /// The external training process could not be run.
    #[error("Training process error: {detail}")]
    Training {
        /// What failed around the subprocess.
        detail: String,
    },

    /// The external training process ran and exited non-zero.
    #[error("Training failed with exit code {exit_code}: {stderr}")]
    TrainingFailed {
        /// Exit code of the child process.
        exit_code: i32,
        /// Last line the child wrote to stderr.
        stderr: String,
    },

    /// A lock was poisoned by a panicking thread.
    #[error("Internal error: {0}")]
    Internal(String),
}
