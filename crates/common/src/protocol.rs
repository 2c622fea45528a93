//! Control plane / execution plane protocol
//!
//! Messages exchanged over HTTP between the API, the runner and clients.

use crate::diff::DiffEntry;
use crate::types::{Artifacts, Run, RunStatus, Scenario, Step, TestResult, TestSelection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job handed from the control plane to the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub run_id: String,
    pub scenario_id: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    #[serde(default)]
    pub tests: TestSelection,
    /// Wall-clock budget for the job; the runner default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

/// Runner acknowledgement of a dispatched job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub accepted: bool,
    pub run_id: String,
}

/// Partial details carried by an incremental update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailsPatch {
    /// Appended to the run's step log
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Replaces the run's test list when present
    #[serde(default)]
    pub tests: Option<Vec<TestResult>>,
    /// Shallow-merged into the run's metadata
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

/// Merge-style progress report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalUpdate {
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub details: Option<DetailsPatch>,
    #[serde(default)]
    pub artifacts: Option<Artifacts>,
}

impl IncrementalUpdate {
    /// The update sent as soon as a runner takes a job
    pub fn accepted() -> Self {
        Self {
            status: Some(RunStatus::Running),
            details: Some(DetailsPatch {
                steps: vec![Step::pass("Runner accepted job")],
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Details carried by a terminal completion, replacing the stored ones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub tests: Vec<TestResult>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// Replace-style final report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalComplete {
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub details: Option<CompletionDetails>,
    #[serde(default)]
    pub artifacts: Option<Artifacts>,
}

impl TerminalComplete {
    /// A failed completion carrying a single diagnostic step
    pub fn failure(step: Step, meta: Map<String, Value>) -> Self {
        Self {
            status: Some(RunStatus::Fail),
            details: Some(CompletionDetails {
                steps: vec![step],
                tests: Vec::new(),
                meta,
            }),
            artifacts: None,
        }
    }
}

/// Any callback a runner can send about a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    Incremental(IncrementalUpdate),
    Terminal(TerminalComplete),
}

impl RunUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunUpdate::Terminal(_))
    }

    /// Path segment of the callback endpoint
    pub fn endpoint(&self) -> &'static str {
        match self {
            RunUpdate::Incremental(_) => "update",
            RunUpdate::Terminal(_) => "complete",
        }
    }
}

/// Client submission body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRunRequest {
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub tests: TestSelection,
}

/// Outcome of a bulk clear
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub runs_removed: usize,
    pub dirs_deleted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiffReport {
    pub run_a: String,
    pub run_b: String,
    pub diff_count: usize,
    pub diffs: Vec<DiffEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRunsResponse {
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenariosResponse {
    pub scenarios: Vec<Scenario>,
}
