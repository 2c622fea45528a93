//! Job execution pipeline
//!
//! Resolves a scenario's suites, runs every selected test in its own browser
//! session, persists the result tree and turns it into the flat results and
//! artifact descriptors reported back to the control plane.

use futures::FutureExt;
use loginlab_common::artifact::{report_url, screenshot_file_name};
use loginlab_common::{
    summarize, ArtifactStore, Artifacts, DispatchRequest, RunStatus, ScreenshotKind, Summary,
    TestResult, TestStatus,
};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{BrowserDriver, BrowserSession, SessionOptions};
use crate::error::{RunnerError, RunnerResult};
use crate::report::{self, ReportDocument, SuiteReport, TestReport};
use crate::selection::TestFilter;
use crate::suites::{SuiteMap, TestCase, TestStep, TestSuite};

/// Result of a finished pipeline
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    pub tests: Vec<TestResult>,
    pub summary: Summary,
    pub artifacts: Artifacts,
}

/// Runs jobs against a browser driver
#[derive(Clone)]
pub struct Executor {
    suites: Arc<SuiteMap>,
    driver: Arc<dyn BrowserDriver>,
    artifacts: ArtifactStore,
}

impl Executor {
    pub fn new(suites: Arc<SuiteMap>, driver: Arc<dyn BrowserDriver>, artifacts: ArtifactStore) -> Self {
        Self {
            suites,
            driver,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Execute one job. The token is checked before every test.
    pub async fn run(
        &self,
        request: &DispatchRequest,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionOutcome> {
        let run_id = request.run_id.as_str();
        let suites = self.suites.load(&request.scenario_id)?;
        let filter = TestFilter::new(&request.tests)?;
        self.artifacts.prepare_run(run_id).await?;

        info!(
            run_id,
            scenario_id = %request.scenario_id,
            suites = suites.len(),
            "Executing job"
        );

        let options = SessionOptions {
            base_url: request.base_url.clone(),
        };
        let started = chrono::Utc::now();
        let mut document = ReportDocument {
            run_id: run_id.to_string(),
            scenario_id: request.scenario_id.clone(),
            ..Default::default()
        };

        for suite in &suites {
            let mut suite_report = SuiteReport {
                title: suite.title.clone(),
                ..Default::default()
            };

            for case in suite.tests.iter().filter(|c| filter.matches_test(suite, &c.title)) {
                if cancel.is_cancelled() {
                    return Err(RunnerError::Cancelled);
                }
                let test = self.run_case(run_id, suite, case, &options).await;
                suite_report.tests.push(test);
            }

            if !suite_report.tests.is_empty() {
                document.results.push(suite_report);
            }
        }

        document.finalize(started, chrono::Utc::now());
        let report_dir = self.artifacts.report_dir(run_id);
        document.write(&report_dir).await?;

        let tests = report::read_flattened(&self.artifacts.report_json(run_id)).await;
        let summary = summarize(&tests);
        let status = if tests.iter().any(|t| t.status == TestStatus::Fail) {
            RunStatus::Fail
        } else {
            RunStatus::Pass
        };

        let screenshots = match self.artifacts.scan_screenshots(run_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(run_id, error = %e, "Could not list screenshots");
                Vec::new()
            }
        };

        info!(
            run_id,
            pass = summary.pass,
            fail = summary.fail,
            total = summary.total,
            "Job finished"
        );

        Ok(ExecutionOutcome {
            status,
            tests,
            summary,
            artifacts: Artifacts {
                report_path: Some(self.artifacts.report_html(run_id).display().to_string()),
                report_url: Some(report_url(run_id)),
                screenshots,
            },
        })
    }

    /// Run one test in a fresh session; never fails the job
    async fn run_case(
        &self,
        run_id: &str,
        suite: &TestSuite,
        case: &TestCase,
        options: &SessionOptions,
    ) -> TestReport {
        let started = Instant::now();
        debug!(run_id, test = %case.title, "Starting test");

        let mut session = match self.driver.open(options).await {
            Ok(session) => session,
            Err(e) => {
                warn!(run_id, test = %case.title, error = %e, "Could not open browser session");
                return TestReport::failed(
                    &case.title,
                    &suite.title,
                    elapsed_ms(started),
                    e.to_string(),
                    None,
                );
            }
        };

        let steps = TestStep::flatten(&case.steps);
        let outcome = AssertUnwindSafe(run_steps(session.as_mut(), &steps))
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some((e.to_string(), None)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                Some((format!("test panicked: {}", message), Some(message)))
            }
        };

        let dir = self.artifacts.screenshots_dir(run_id);
        let mut screenshots = Vec::new();
        if failure.is_some() {
            let shot = capture(session.as_mut(), &dir, &case.title, ScreenshotKind::OnFailure).await;
            screenshots.extend(shot);
        }
        let shot = capture(session.as_mut(), &dir, &case.title, ScreenshotKind::Always).await;
        screenshots.extend(shot);

        if let Err(e) = session.close().await {
            warn!(run_id, test = %case.title, error = %e, "Failed to close browser session");
        }

        let duration = elapsed_ms(started);
        let report = match failure {
            None => {
                debug!(run_id, test = %case.title, "Test passed");
                TestReport::passed(&case.title, &suite.title, duration)
            }
            Some((message, estack)) => {
                info!(run_id, test = %case.title, error = %message, "Test failed");
                TestReport::failed(&case.title, &suite.title, duration, message, estack)
            }
        };
        report.with_screenshots(screenshots)
    }
}

async fn run_steps(session: &mut dyn BrowserSession, steps: &[TestStep]) -> RunnerResult<()> {
    for step in steps {
        session.run_step(step).await.map_err(|e| match e {
            RunnerError::StepFailed { .. } => e,
            other => RunnerError::StepFailed {
                step: step.name(),
                reason: other.to_string(),
            },
        })?;
    }
    Ok(())
}

/// Take a screenshot; returns its file name when one was written
async fn capture(
    session: &mut dyn BrowserSession,
    dir: &Path,
    title: &str,
    kind: ScreenshotKind,
) -> Option<String> {
    let name = screenshot_file_name(chrono::Utc::now().timestamp_millis(), title, kind);
    match session.screenshot(&dir.join(&name)).await {
        Ok(()) => Some(name),
        Err(e) => {
            warn!(test = %title, error = %e, "Screenshot failed");
            None
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scriptable in-process driver.
    ///
    /// `assert_text` fails when `contains` is `FAIL`; a click on `panic`
    /// panics; every other step succeeds.
    #[derive(Default)]
    pub struct FakeDriver {
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        pub navigations: Arc<Log>,
        pub fail_open: bool,
        pub panic_on_screenshot: bool,
        pub step_delay_ms: u64,
    }

    /// Append-only record of visited URLs
    #[derive(Default)]
    pub struct Log(Mutex<Vec<String>>);

    impl Log {
        pub fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        pub fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakeSession {
        closed: Arc<AtomicUsize>,
        navigations: Arc<Log>,
        base_url: String,
        panic_on_screenshot: bool,
        step_delay_ms: u64,
    }

    #[async_trait]
    impl BrowserDriver for FakeDriver {
        async fn open(&self, options: &SessionOptions) -> RunnerResult<Box<dyn BrowserSession>> {
            if self.fail_open {
                return Err(RunnerError::Driver("browser did not start".to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                closed: self.closed.clone(),
                navigations: self.navigations.clone(),
                base_url: options.base_url.clone(),
                panic_on_screenshot: self.panic_on_screenshot,
                step_delay_ms: self.step_delay_ms,
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn run_step(&mut self, step: &TestStep) -> RunnerResult<()> {
            if self.step_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.step_delay_ms)).await;
            }
            match step {
                TestStep::Navigate { url } => {
                    self.navigations.push(format!("{}{}", self.base_url, url));
                    Ok(())
                }
                TestStep::AssertText { selector, contains, .. } if contains == "FAIL" => {
                    Err(RunnerError::StepFailed {
                        step: step.name(),
                        reason: format!("{} did not contain {:?}", selector, contains),
                    })
                }
                TestStep::Click { selector } if selector == "panic" => panic!("driver exploded"),
                _ => Ok(()),
            }
        }

        async fn screenshot(&mut self, path: &Path) -> RunnerResult<()> {
            if self.panic_on_screenshot {
                panic!("screenshot exploded");
            }
            tokio::fs::write(path, b"\x89PNG\r\n\x1a\n").await?;
            Ok(())
        }

        async fn close(&mut self) -> RunnerResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub const SUITE: &str = r##"
scenario_id: s-test-0001
title: Demo
tests:
  - title: T1
    steps:
      - action: navigate
        url: /one
  - title: T2
    steps:
      - action: navigate
        url: /two
      - action: assert_text
        selector: "#msg"
        contains: FAIL
  - title: T3
    steps:
      - action: navigate
        url: /three
"##;

    pub fn suite_map(dir: &Path, yaml: &str) -> Arc<SuiteMap> {
        std::fs::write(dir.join("demo.yaml"), yaml).unwrap();
        Arc::new(SuiteMap::discover(dir).unwrap())
    }

    pub fn request(run_id: &str, tests: loginlab_common::TestSelection) -> DispatchRequest {
        DispatchRequest {
            run_id: run_id.to_string(),
            scenario_id: "s-test-0001".to_string(),
            base_url: "http://target".to_string(),
            tests,
            deadline_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use loginlab_common::TestSelection;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Fixture {
        _suites: TempDir,
        artifacts: TempDir,
        driver: Arc<FakeDriver>,
        executor: Executor,
    }

    fn fixture(yaml: &str, driver: FakeDriver) -> Fixture {
        let suites = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        let driver = Arc::new(driver);
        let executor = Executor::new(
            suite_map(suites.path(), yaml),
            driver.clone(),
            ArtifactStore::new(artifacts.path()),
        );
        Fixture {
            _suites: suites,
            artifacts,
            driver,
            executor,
        }
    }

    fn titles(t: &[&str]) -> TestSelection {
        TestSelection::Titles(t.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_selection_runs_only_matching_titles() {
        let f = fixture(SUITE, FakeDriver::default());
        let outcome = f
            .executor
            .run(&request("r1", titles(&["T1"])), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.tests.len(), 1);
        assert_eq!(outcome.tests[0].title, "Demo T1");
        assert_eq!(outcome.status, RunStatus::Pass);
        assert_eq!(f.driver.navigations.entries(), vec!["http://target/one"]);
        assert_eq!(f.driver.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_selection_by_full_title() {
        let f = fixture(SUITE, FakeDriver::default());
        let outcome = f
            .executor
            .run(&request("r1", titles(&["Demo T1", "Demo T3"])), &CancellationToken::new())
            .await
            .unwrap();

        let ran: Vec<&str> = outcome.tests.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(ran, vec!["Demo T1", "Demo T3"]);
        assert_eq!(
            f.driver.navigations.entries(),
            vec!["http://target/one", "http://target/three"]
        );
    }

    #[tokio::test]
    async fn test_all_runs_every_test() {
        let f = fixture(SUITE, FakeDriver::default());
        let outcome = f
            .executor
            .run(&request("r1", TestSelection::All), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.tests.len(), 3);
        assert_eq!(outcome.summary, Summary { pass: 2, fail: 1, total: 3 });
        assert_eq!(outcome.status, RunStatus::Fail);
        assert!(outcome.tests[1].error.as_deref().unwrap().contains("#msg"));
        assert_eq!(f.driver.opened.load(Ordering::SeqCst), 3);
        assert_eq!(f.driver.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_selection_runs_nothing() {
        let f = fixture(SUITE, FakeDriver::default());
        let outcome = f
            .executor
            .run(&request("r1", titles(&[])), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.tests.is_empty());
        assert_eq!(outcome.status, RunStatus::Pass);
        assert_eq!(f.driver.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_screenshots_for_every_test_and_failures() {
        let f = fixture(SUITE, FakeDriver::default());
        let outcome = f
            .executor
            .run(&request("r1", TestSelection::All), &CancellationToken::new())
            .await
            .unwrap();

        let shots = &outcome.artifacts.screenshots;
        let always = shots.iter().filter(|s| s.kind == ScreenshotKind::Always).count();
        let failures: Vec<_> = shots
            .iter()
            .filter(|s| s.kind == ScreenshotKind::OnFailure)
            .collect();
        assert_eq!(always, 3);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].name.ends_with("_T2_fail.png"));
        assert!(failures[0].url.starts_with("/artifacts/runs/r1/screenshots/"));

        assert_eq!(
            outcome.artifacts.report_url.as_deref(),
            Some("/artifacts/runs/r1/report/index.html")
        );
        assert!(f.artifacts.path().join("runs/r1/report/index.json").exists());
        assert!(f.artifacts.path().join("runs/r1/report/index.html").exists());
    }

    #[tokio::test]
    async fn test_report_links_tests_to_screenshots() {
        let f = fixture(SUITE, FakeDriver::default());
        f.executor
            .run(&request("r1", TestSelection::All), &CancellationToken::new())
            .await
            .unwrap();

        let path = f.artifacts.path().join("runs/r1/report/index.json");
        let doc: ReportDocument =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let tests = &doc.results[0].tests;
        let shots_dir = f.artifacts.path().join("runs/r1/screenshots");

        for test in tests {
            let kinds: Vec<ScreenshotKind> = test
                .screenshots
                .iter()
                .map(|name| ScreenshotKind::from_file_name(name))
                .collect();
            let expected = if test.fail {
                vec![ScreenshotKind::OnFailure, ScreenshotKind::Always]
            } else {
                vec![ScreenshotKind::Always]
            };
            assert_eq!(kinds, expected, "{}", test.title);
            assert!(test.screenshots.iter().all(|n| shots_dir.join(n).exists()));
        }

        let html = std::fs::read_to_string(f.artifacts.path().join("runs/r1/report/index.html"))
            .unwrap();
        assert!(html.contains(&format!("../screenshots/{}", tests[1].screenshots[0])));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_and_session_closes() {
        let yaml = r#"
scenario_id: s-test-0001
title: Demo
tests:
  - title: Boom
    steps:
      - action: click
        selector: panic
"#;
        let f = fixture(yaml, FakeDriver::default());
        let outcome = f
            .executor
            .run(&request("r1", TestSelection::All), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.tests[0].status, TestStatus::Fail);
        assert!(outcome.tests[0].error.as_deref().unwrap().contains("driver exploded"));
        assert_eq!(f.driver.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_open_failure_fails_test() {
        let f = fixture(
            SUITE,
            FakeDriver {
                fail_open: true,
                ..Default::default()
            },
        );
        let outcome = f
            .executor
            .run(&request("r1", titles(&["T1"])), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Fail);
        assert!(outcome.tests[0].error.as_deref().unwrap().contains("browser did not start"));
    }

    #[tokio::test]
    async fn test_unknown_scenario_is_error() {
        let f = fixture(SUITE, FakeDriver::default());
        let mut req = request("r1", TestSelection::All);
        req.scenario_id = "s-missing".to_string();

        let err = f.executor.run(&req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Common(loginlab_common::Error::UnknownScenario(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_test() {
        let f = fixture(SUITE, FakeDriver::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = f
            .executor
            .run(&request("r1", TestSelection::All), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
        assert_eq!(f.driver.opened.load(Ordering::SeqCst), 0);
    }
}
