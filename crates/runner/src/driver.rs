//! Browser driver abstraction
//!
//! The executor only sees these traits; the production implementation is
//! the Playwright bridge in [`crate::playwright`].

use async_trait::async_trait;
use std::path::Path;

use crate::error::RunnerResult;
use crate::suites::TestStep;

/// Per-session parameters
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Target application root; navigation paths are relative to it
    pub base_url: String,
}

/// Opens isolated browser sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self, options: &SessionOptions) -> RunnerResult<Box<dyn BrowserSession>>;
}

/// One isolated browser context. Must be closed on every exit path.
#[async_trait]
pub trait BrowserSession: Send {
    /// Execute a single, non-repeating step
    async fn run_step(&mut self, step: &TestStep) -> RunnerResult<()>;

    /// Full-page PNG screenshot written to `path`
    async fn screenshot(&mut self, path: &Path) -> RunnerResult<()>;

    async fn close(&mut self) -> RunnerResult<()>;
}
