//! Error types for the runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Common(#[from] loginlab_common::Error),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Suite parse error in {file}: {reason}")]
    SuiteParse { file: String, reason: String },

    #[error("Invalid test selection: {0}")]
    Selection(#[from] regex::Error),

    #[error("Deadline of {0}s exceeded")]
    DeadlineExceeded(u64),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Runner is shutting down")]
    ShuttingDown,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
