//! LoginLab execution plane
//!
//! Receives jobs from the control plane and runs the selected tests of a
//! scenario in isolated browser sessions.
//!
//! # Architecture
//!
//! ```text
//! POST /execute -> Worker (queue, deadline, cancel)
//!                    └── Executor
//!                          ├── SuiteMap      scenario -> YAML suites
//!                          ├── TestFilter    title selection
//!                          ├── BrowserDriver one session per test
//!                          └── report        index.json / index.html
//!                  -> StatusReporter (update, complete)
//! ```

pub mod callback;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod playwright;
pub mod report;
pub mod selection;
pub mod server;
pub mod suites;
pub mod worker;

pub use callback::{HttpStatusReporter, StatusReporter};
pub use config::RunnerConfig;
pub use driver::{BrowserDriver, BrowserSession, SessionOptions};
pub use error::{RunnerError, RunnerResult};
pub use executor::{ExecutionOutcome, Executor};
pub use playwright::{PlaywrightConfig, PlaywrightDriver};
pub use selection::TestFilter;
pub use server::{router, RunnerState};
pub use suites::{SuiteMap, TestCase, TestStep, TestSuite};
pub use worker::Worker;
