//! Run report
//!
//! The executor writes a nested result tree (suites containing tests) as
//! `index.json` plus a static `index.html`. Results are then read back from
//! the JSON file and flattened, so the flat list always reflects exactly
//! what was persisted.

use loginlab_common::{Error, TestResult, TestStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::error::RunnerResult;
use crate::suites::full_title;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportStats {
    pub suites: usize,
    pub tests: usize,
    pub passes: usize,
    pub failures: usize,
    pub pending: usize,
    pub start: String,
    pub end: String,
    pub duration: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estack: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub title: String,
    pub full_title: String,
    pub state: String,
    pub pass: bool,
    pub fail: bool,
    pub pending: bool,
    /// Milliseconds
    pub duration: u64,
    #[serde(default)]
    pub err: ReportError,
    /// File names under the run's `screenshots/` directory
    #[serde(default)]
    pub screenshots: Vec<String>,
}

impl TestReport {
    pub fn passed(title: &str, suite: &str, duration: u64) -> Self {
        Self::new(title, suite, "passed", duration, ReportError::default())
    }

    pub fn failed(title: &str, suite: &str, duration: u64, message: String, estack: Option<String>) -> Self {
        Self::new(
            title,
            suite,
            "failed",
            duration,
            ReportError {
                message: Some(message),
                estack,
            },
        )
    }

    fn new(title: &str, suite: &str, state: &str, duration: u64, err: ReportError) -> Self {
        Self {
            title: title.to_string(),
            full_title: full_title(suite, title),
            state: state.to_string(),
            pass: state == "passed",
            fail: state == "failed",
            pending: state == "pending",
            duration,
            err,
            screenshots: Vec::new(),
        }
    }

    pub fn with_screenshots(mut self, screenshots: Vec<String>) -> Self {
        self.screenshots = screenshots;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    pub title: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub tests: Vec<TestReport>,
    #[serde(default)]
    pub suites: Vec<SuiteReport>,
}

/// Root of the persisted result tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportDocument {
    pub run_id: String,
    pub scenario_id: String,
    pub stats: ReportStats,
    pub results: Vec<SuiteReport>,
}

impl ReportDocument {
    /// Recompute `stats` from the suite tree
    pub fn finalize(&mut self, start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) {
        fn walk(suites: &[SuiteReport], stats: &mut ReportStats) {
            for suite in suites {
                stats.suites += 1;
                for test in &suite.tests {
                    stats.tests += 1;
                    if test.pass {
                        stats.passes += 1;
                    } else if test.fail {
                        stats.failures += 1;
                    } else if test.pending {
                        stats.pending += 1;
                    }
                }
                walk(&suite.suites, stats);
            }
        }

        let mut stats = ReportStats {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            duration: (end - start).num_milliseconds().max(0) as u64,
            ..Default::default()
        };
        walk(&self.results, &mut stats);
        self.stats = stats;
    }

    /// Write `index.json` and `index.html` into `dir`
    pub async fn write(&self, dir: &Path) -> RunnerResult<()> {
        tokio::fs::create_dir_all(dir).await?;
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(dir.join("index.json"), json).await?;
        tokio::fs::write(dir.join("index.html"), self.to_html()).await?;
        info!("Report written to: {}", dir.display());
        Ok(())
    }

    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        for suite in &self.results {
            append_rows(suite, &mut rows);
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Run {run_id}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; width: 100%; }}
td, th {{ border: 1px solid #ccc; padding: 0.4rem; text-align: left; vertical-align: top; }}
.passed {{ color: #1a7f37; }}
.failed {{ color: #cf222e; }}
.pending {{ color: #9a6700; }}
pre {{ margin: 0; white-space: pre-wrap; }}
</style>
</head>
<body>
<h1>Run {run_id}</h1>
<p>Scenario {scenario_id}: {passes} passed, {failures} failed, {pending} pending, {tests} total ({duration} ms)</p>
<table>
<tr><th>Suite</th><th>Test</th><th>State</th><th>Duration (ms)</th><th>Error</th><th>Screenshots</th></tr>
{rows}</table>
</body>
</html>
"#,
            run_id = escape_html(&self.run_id),
            scenario_id = escape_html(&self.scenario_id),
            passes = self.stats.passes,
            failures = self.stats.failures,
            pending = self.stats.pending,
            tests = self.stats.tests,
            duration = self.stats.duration,
            rows = rows,
        )
    }
}

fn append_rows(suite: &SuiteReport, out: &mut String) {
    for test in &suite.tests {
        let error = test.err.message.as_deref().unwrap_or("");
        let shots: Vec<String> = test
            .screenshots
            .iter()
            .map(|name| {
                let name = escape_html(name);
                format!("<a href=\"../screenshots/{}\">{}</a>", name, name)
            })
            .collect();
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td><pre>{}</pre></td><td>{}</td></tr>\n",
            escape_html(&suite.title),
            escape_html(&test.title),
            escape_html(&test.state),
            escape_html(&test.state),
            test.duration,
            escape_html(error),
            shots.join("<br>"),
        ));
    }
    for child in &suite.suites {
        append_rows(child, out);
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Flatten a result tree into test results.
///
/// Works on raw JSON so reports from other tooling (camelCase `fullTitle`,
/// missing flags) flatten too.
pub fn flatten(doc: &Value) -> Vec<TestResult> {
    let mut out = Vec::new();
    if let Some(results) = doc.get("results").and_then(Value::as_array) {
        for suite in results {
            flatten_suite(suite, &mut out);
        }
    }
    out
}

fn flatten_suite(suite: &Value, out: &mut Vec<TestResult>) {
    if let Some(tests) = suite.get("tests").and_then(Value::as_array) {
        out.extend(tests.iter().map(flatten_test));
    }
    if let Some(children) = suite.get("suites").and_then(Value::as_array) {
        for child in children {
            flatten_suite(child, out);
        }
    }
}

fn flatten_test(test: &Value) -> TestResult {
    let flag = |name: &str| test.get(name).and_then(Value::as_bool).unwrap_or(false);
    let text = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let status = if flag("pass") {
        TestStatus::Pass
    } else if flag("fail") {
        TestStatus::Fail
    } else if flag("pending") {
        TestStatus::Pending
    } else {
        match test.get("state").and_then(Value::as_str).filter(|s| !s.is_empty()) {
            Some("passed") => TestStatus::Pass,
            Some("failed") => TestStatus::Fail,
            Some("pending") => TestStatus::Pending,
            Some(raw) => TestStatus::Other(raw.to_string()),
            None => TestStatus::Unknown,
        }
    };

    let title = text(test.get("full_title"))
        .or_else(|| text(test.get("fullTitle")))
        .or_else(|| text(test.get("title")))
        .unwrap_or_default();

    let err = test.get("err");
    let error = text(err.and_then(|e| e.get("message")))
        .or_else(|| text(err.and_then(|e| e.get("estack"))));

    TestResult {
        title,
        status,
        duration_ms: test.get("duration").and_then(Value::as_u64).unwrap_or(0),
        error,
    }
}

/// Read and flatten a persisted report. An unreadable or unparseable file
/// yields an empty list.
pub async fn read_flattened(path: &Path) -> Vec<TestResult> {
    let parsed = match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str::<Value>(&content)
            .map_err(|e| Error::MalformedReport(format!("{}: {}", path.display(), e))),
        Err(e) => Err(Error::MalformedReport(format!("{}: {}", path.display(), e))),
    };

    match parsed {
        Ok(doc) => flatten(&doc),
        Err(e) => {
            warn!(error = %e, "Discarding report");
            Vec::new()
        }
    }
}
