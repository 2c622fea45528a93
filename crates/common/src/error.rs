//! Error types for LoginLab

use thiserror::Error;

/// Result type alias using LoginLab Error
pub type Result<T> = std::result::Result<T, Error>;

/// LoginLab error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown scenario_id: {0}")]
    UnknownScenario(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Failed to delete artifacts for run {id}: {reason}")]
    ArtifactCleanup { id: String, reason: String },

    #[error("Malformed report artifact: {0}")]
    MalformedReport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a missing run
    pub fn run_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "run".to_string(),
            id: id.into(),
        }
    }

    /// Whether the caller sent something the system cannot act on
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownScenario(_) | Error::NotFound { .. } | Error::InvalidConfig(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
