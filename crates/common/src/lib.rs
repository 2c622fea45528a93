//! LoginLab Common Library
//!
//! Shared data model, control/execution plane protocol, scenario catalog,
//! result aggregation and the structural diff engine.

pub mod aggregate;
pub mod artifact;
pub mod catalog;
pub mod diff;
pub mod error;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use aggregate::summarize;
pub use artifact::ArtifactStore;
pub use catalog::ScenarioCatalog;
pub use diff::{diff, diff_values, DiffEntry};
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;

/// LoginLab version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Scenario used when a submission names none
pub const DEFAULT_SCENARIO_ID: &str = "s-basic-0001";

/// Current wall-clock time in epoch seconds
pub fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Default artifact root
pub fn default_artifacts_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("artifacts")
}
