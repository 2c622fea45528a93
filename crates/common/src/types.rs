//! Core types for LoginLab

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Pass,
    Fail,
}

impl RunStatus {
    /// `pass` and `fail` have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Pass | RunStatus::Fail)
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Pass => write!(f, "pass"),
            RunStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Outcome of a single test.
///
/// Reports produced by other tooling may carry arbitrary state strings;
/// those survive verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestStatus {
    Pass,
    Fail,
    Pending,
    Unknown,
    Other(String),
}

impl TestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Pending => "pending",
            TestStatus::Unknown => "unknown",
            TestStatus::Other(s) => s,
        }
    }
}

impl From<String> for TestStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pass" => TestStatus::Pass,
            "fail" => TestStatus::Fail,
            "pending" => TestStatus::Pending,
            "unknown" => TestStatus::Unknown,
            _ => TestStatus::Other(s),
        }
    }
}

impl From<&str> for TestStatus {
    fn from(s: &str) -> Self {
        TestStatus::from(s.to_string())
    }
}

impl From<TestStatus> for String {
    fn from(status: TestStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tests of a scenario a run executes.
///
/// On the wire `null` (or a missing field) means every test and an array
/// lists literal titles. An empty array selects nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<String>>", into = "Option<Vec<String>>")]
pub enum TestSelection {
    #[default]
    All,
    Titles(Vec<String>),
}

impl TestSelection {
    pub fn is_all(&self) -> bool {
        matches!(self, TestSelection::All)
    }

    /// Number of selected titles, `None` for all
    pub fn count(&self) -> Option<usize> {
        match self {
            TestSelection::All => None,
            TestSelection::Titles(t) => Some(t.len()),
        }
    }
}

impl From<Option<Vec<String>>> for TestSelection {
    fn from(v: Option<Vec<String>>) -> Self {
        match v {
            None => TestSelection::All,
            Some(titles) => TestSelection::Titles(titles),
        }
    }
}

impl From<TestSelection> for Option<Vec<String>> {
    fn from(s: TestSelection) -> Self {
        match s {
            TestSelection::All => None,
            TestSelection::Titles(titles) => Some(titles),
        }
    }
}

/// Step status in the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
}

/// One entry of a run's step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pass,
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Fail,
            error: Some(error.into()),
        }
    }
}

/// Flattened result of one executed test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub title: String,
    pub status: TestStatus,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, alias = "err")]
    pub error: Option<String>,
}

/// Derived pass/fail/total counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub pass: usize,
    pub fail: usize,
    pub total: usize,
}

/// Run metadata: the derived summary plus free-form request context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(default)]
    pub summary: Summary,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Step log, test results and metadata of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub tests: Vec<TestResult>,
    #[serde(default)]
    pub meta: RunMeta,
}

impl RunDetails {
    /// Recompute the summary from the current test list
    pub fn refresh_summary(&mut self) {
        self.meta.summary = crate::aggregate::summarize(&self.tests);
    }

    pub fn has_failures(&self) -> bool {
        self.tests.iter().any(|t| t.status == TestStatus::Fail)
    }
}

/// Why a screenshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotKind {
    OnFailure,
    #[default]
    Always,
}

impl ScreenshotKind {
    /// File name suffix before the extension
    pub fn suffix(self) -> &'static str {
        match self {
            ScreenshotKind::OnFailure => "_fail",
            ScreenshotKind::Always => "_all",
        }
    }

    /// Classify by the last suffix of the stem. Unsuffixed files are failure
    /// captures.
    pub fn from_file_name(name: &str) -> Self {
        let stem = name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(name);
        if stem.ends_with(ScreenshotKind::Always.suffix()) {
            ScreenshotKind::Always
        } else {
            ScreenshotKind::OnFailure
        }
    }
}

/// Screenshot descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub kind: ScreenshotKind,
}

/// Persisted byproducts of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, alias = "reportPath")]
    pub report_path: Option<String>,
    #[serde(default, alias = "reportUrl")]
    pub report_url: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,
}

/// One execution attempt of a scenario's tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub scenario_id: String,
    pub status: RunStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub selected_tests: TestSelection,
    #[serde(default)]
    pub details: RunDetails,
    #[serde(default)]
    pub artifacts: Option<Artifacts>,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Duration in seconds once finished
    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at.map(|f| (f - self.started_at).max(0))
    }

    /// Screenshots recorded in the run's artifacts
    pub fn stored_screenshots(&self) -> &[Screenshot] {
        self.artifacts
            .as_ref()
            .map(|a| a.screenshots.as_slice())
            .unwrap_or(&[])
    }
}

/// Predefined target application plus its catalog of test titles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(alias = "targetBaseUrl")]
    pub target_base_url: String,
    #[serde(default)]
    pub tests: Vec<String>,
}
