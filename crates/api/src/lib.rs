//! LoginLab control plane
//!
//! Owns run state: accepts submissions, hands jobs to the runner, applies
//! runner callbacks and serves results, artifacts and run diffs.

pub mod config;
pub mod dispatch;
pub mod reaper;
pub mod registry;
pub mod server;

pub use config::ApiConfig;
pub use dispatch::{Dispatcher, HttpRunnerTransport, RunnerTransport};
pub use reaper::Reaper;
pub use registry::{MemoryRunStore, RunRegistry, RunStore};
pub use server::{router, ApiError, ApiState};
