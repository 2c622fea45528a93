//! Job queue
//!
//! Accepted jobs are handed to a background loop that spawns one task per
//! job. Each task reports `running` straight away, waits for a concurrency
//! slot, runs the executor under the job's deadline and finally sends
//! exactly one terminal completion.

use dashmap::DashMap;
use futures::FutureExt;
use loginlab_common::{
    CompletionDetails, DispatchRequest, IncrementalUpdate, RunUpdate, Step, TerminalComplete,
};
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::callback::StatusReporter;
use crate::error::{RunnerError, RunnerResult};
use crate::executor::{panic_message, ExecutionOutcome, Executor};

pub const ACCEPTED_STEP: &str = "Runner accepted job";
pub const EXCEPTION_STEP: &str = "Runner exception";
pub const DEADLINE_STEP: &str = "Run deadline exceeded";
pub const CANCELLED_STEP: &str = "Run cancelled";

struct Shared {
    executor: Executor,
    reporter: Arc<dyn StatusReporter>,
    slots: Semaphore,
    jobs: DashMap<String, CancellationToken>,
    default_deadline: Duration,
}

/// Handle for queueing and cancelling jobs
#[derive(Clone)]
pub struct Worker {
    tx: mpsc::UnboundedSender<(DispatchRequest, CancellationToken)>,
    shared: Arc<Shared>,
}

impl Worker {
    /// Spawn the job loop. At most `concurrency` jobs execute at once.
    pub fn start(
        executor: Executor,
        reporter: Arc<dyn StatusReporter>,
        concurrency: usize,
        default_deadline: Duration,
    ) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            executor,
            reporter,
            slots: Semaphore::new(concurrency.max(1)),
            jobs: DashMap::new(),
            default_deadline,
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<(DispatchRequest, CancellationToken)>();

        let loop_shared = shared.clone();
        let handle = tokio::spawn(async move {
            info!("Worker started with {} slot(s)", concurrency.max(1));
            while let Some((request, token)) = rx.recv().await {
                let shared = loop_shared.clone();
                tokio::spawn(async move {
                    run_job(&shared, request, token).await;
                });
            }
            info!("Worker stopped");
        });

        (Self { tx, shared }, handle)
    }

    /// Queue a job. Returns `false` when a job with the same run id is
    /// already queued or running; the existing job is left alone.
    pub fn submit(&self, request: DispatchRequest) -> RunnerResult<bool> {
        let token = CancellationToken::new();
        match self.shared.jobs.entry(request.run_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(run_id = %request.run_id, "Job already queued");
                return Ok(false);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        let run_id = request.run_id.clone();
        self.tx.send((request, token)).map_err(|_| {
            self.shared.jobs.remove(&run_id);
            RunnerError::ShuttingDown
        })?;
        Ok(true)
    }

    /// Cancel a queued or running job
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.shared.jobs.get(run_id) {
            Some(token) => {
                info!(run_id, "Cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Jobs queued or running
    pub fn active_jobs(&self) -> usize {
        self.shared.jobs.len()
    }
}

/// Releases a job's run id however its task ends
struct JobGuard<'a> {
    jobs: &'a DashMap<String, CancellationToken>,
    run_id: String,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.jobs.remove(&self.run_id);
    }
}

async fn run_job(shared: &Shared, request: DispatchRequest, token: CancellationToken) {
    let run_id = request.run_id.clone();
    let _guard = JobGuard {
        jobs: &shared.jobs,
        run_id: run_id.clone(),
    };

    send(
        shared,
        &run_id,
        RunUpdate::Incremental(IncrementalUpdate::accepted()),
    )
    .await;

    let deadline = request
        .deadline_secs
        .map(Duration::from_secs)
        .unwrap_or(shared.default_deadline);

    let execution = async {
        let _permit = shared
            .slots
            .acquire()
            .await
            .map_err(|_| RunnerError::ShuttingDown)?;
        debug!(run_id = %run_id, "Job acquired execution slot");

        match tokio::time::timeout(deadline, shared.executor.run(&request, &token)).await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::DeadlineExceeded(deadline.as_secs())),
        }
    };

    let result = tokio::select! {
        _ = token.cancelled() => Err(RunnerError::Cancelled),
        caught = AssertUnwindSafe(execution).catch_unwind() => match caught {
            Ok(result) => result,
            Err(panic) => Err(RunnerError::Panicked(panic_message(panic.as_ref()))),
        },
    };

    let complete = match result {
        Ok(outcome) => success(&request, outcome),
        Err(e) => {
            let step = match &e {
                RunnerError::DeadlineExceeded(_) => DEADLINE_STEP,
                RunnerError::Cancelled => CANCELLED_STEP,
                _ => EXCEPTION_STEP,
            };
            warn!(run_id = %run_id, error = %e, "Job failed");
            TerminalComplete::failure(Step::fail(step, e.to_string()), request_meta(&request))
        }
    };

    send(shared, &run_id, RunUpdate::Terminal(complete)).await;
}

fn request_meta(request: &DispatchRequest) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("scenario_id".to_string(), json!(request.scenario_id));
    meta.insert("base_url".to_string(), json!(request.base_url));
    meta
}

fn success(request: &DispatchRequest, outcome: ExecutionOutcome) -> TerminalComplete {
    let mut meta = request_meta(request);
    meta.insert("summary".to_string(), json!(outcome.summary));

    TerminalComplete {
        status: Some(outcome.status),
        details: Some(CompletionDetails {
            steps: Vec::new(),
            tests: outcome.tests,
            meta,
        }),
        artifacts: Some(outcome.artifacts),
    }
}

async fn send(shared: &Shared, run_id: &str, update: RunUpdate) {
    if let Err(e) = shared.reporter.report(run_id, &update).await {
        error!(
            run_id,
            endpoint = update.endpoint(),
            error = %e,
            "Failed to report run update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::fakes::RecordingReporter;
    use crate::executor::fakes::{request, suite_map, FakeDriver, SUITE};
    use loginlab_common::{ArtifactStore, RunStatus, StepStatus, TestSelection};
    use tempfile::TempDir;

    struct Fixture {
        _suites: TempDir,
        _artifacts: TempDir,
        reporter: Arc<RecordingReporter>,
        worker: Worker,
    }

    fn fixture(driver: FakeDriver, default_deadline: Duration) -> Fixture {
        let suites = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();
        let executor = Executor::new(
            suite_map(suites.path(), SUITE),
            Arc::new(driver),
            ArtifactStore::new(artifacts.path()),
        );
        let reporter = Arc::new(RecordingReporter::default());
        let (worker, _) = Worker::start(executor, reporter.clone(), 1, default_deadline);
        Fixture {
            _suites: suites,
            _artifacts: artifacts,
            reporter,
            worker,
        }
    }

    fn terminal(updates: &[RunUpdate]) -> Vec<&TerminalComplete> {
        updates
            .iter()
            .filter_map(|u| match u {
                RunUpdate::Terminal(c) => Some(c),
                RunUpdate::Incremental(_) => None,
            })
            .collect()
    }

    fn steps(complete: &TerminalComplete) -> Vec<(String, StepStatus)> {
        complete
            .details
            .as_ref()
            .map(|d| d.steps.iter().map(|s| (s.name.clone(), s.status)).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_running_then_single_completion() {
        let f = fixture(FakeDriver::default(), Duration::from_secs(30));
        assert!(f.worker.submit(request("r1", TestSelection::All)).unwrap());

        let updates = f.reporter.wait_terminal("r1").await;
        assert_eq!(
            updates[0],
            RunUpdate::Incremental(IncrementalUpdate::accepted())
        );

        let done = terminal(&updates);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].status, Some(RunStatus::Fail));

        let details = done[0].details.as_ref().unwrap();
        assert!(details.steps.is_empty());
        assert_eq!(details.tests.len(), 3);
        assert_eq!(details.meta["scenario_id"], "s-test-0001");
        assert_eq!(details.meta["base_url"], "http://target");
        assert_eq!(details.meta["summary"], json!({ "pass": 2, "fail": 1, "total": 3 }));
        assert!(done[0].artifacts.as_ref().unwrap().report_url.is_some());
    }

    #[tokio::test]
    async fn test_pipeline_error_is_reported_as_failure() {
        let f = fixture(FakeDriver::default(), Duration::from_secs(30));
        let mut req = request("r1", TestSelection::All);
        req.scenario_id = "s-unknown".to_string();
        f.worker.submit(req).unwrap();

        let updates = f.reporter.wait_terminal("r1").await;
        let done = terminal(&updates);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].status, Some(RunStatus::Fail));
        assert_eq!(
            steps(done[0]),
            vec![(EXCEPTION_STEP.to_string(), StepStatus::Fail)]
        );
        assert!(done[0].details.as_ref().unwrap().tests.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_fails_job() {
        let driver = FakeDriver {
            step_delay_ms: 2_000,
            ..Default::default()
        };
        let f = fixture(driver, Duration::from_millis(100));
        f.worker.submit(request("r1", TestSelection::All)).unwrap();

        let updates = f.reporter.wait_terminal("r1").await;
        let done = terminal(&updates);
        assert_eq!(done[0].status, Some(RunStatus::Fail));
        assert_eq!(steps(done[0])[0].0, DEADLINE_STEP);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let driver = FakeDriver {
            step_delay_ms: 2_000,
            ..Default::default()
        };
        let f = fixture(driver, Duration::from_secs(30));
        f.worker.submit(request("r1", TestSelection::All)).unwrap();
        assert!(f.worker.cancel("r1"));

        let updates = f.reporter.wait_terminal("r1").await;
        let done = terminal(&updates);
        assert_eq!(done.len(), 1);
        assert_eq!(steps(done[0])[0].0, CANCELLED_STEP);

        for _ in 0..40 {
            if f.worker.active_jobs() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(f.worker.active_jobs(), 0);
        assert!(!f.worker.cancel("r1"));
    }

    #[tokio::test]
    async fn test_panic_outside_steps_still_completes() {
        let driver = FakeDriver {
            panic_on_screenshot: true,
            ..Default::default()
        };
        let f = fixture(driver, Duration::from_secs(30));
        assert!(f.worker.submit(request("r1", TestSelection::All)).unwrap());

        let updates = f.reporter.wait_terminal("r1").await;
        let done = terminal(&updates);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].status, Some(RunStatus::Fail));
        let steps = &done[0].details.as_ref().unwrap().steps;
        assert_eq!(steps[0].name, EXCEPTION_STEP);
        assert!(steps[0].error.as_deref().unwrap().contains("screenshot exploded"));

        for _ in 0..40 {
            if f.worker.active_jobs() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(f.worker.active_jobs(), 0);
        assert!(f.worker.submit(request("r1", TestSelection::All)).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_run_id_is_ignored() {
        let driver = FakeDriver {
            step_delay_ms: 200,
            ..Default::default()
        };
        let f = fixture(driver, Duration::from_secs(30));
        assert!(f.worker.submit(request("r1", TestSelection::All)).unwrap());
        assert!(!f.worker.submit(request("r1", TestSelection::All)).unwrap());

        let updates = f.reporter.wait_terminal("r1").await;
        assert_eq!(terminal(&updates).len(), 1);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(ACCEPTED_STEP, IncrementalUpdate::accepted().details.unwrap().steps[0].name);
    }
}
