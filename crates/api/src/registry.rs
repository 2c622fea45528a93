//! Run registry
//!
//! Authoritative store of run records. All mutation goes through
//! [`RunRegistry`], which applies the lifecycle rules on top of a pluggable
//! [`RunStore`]. Each operation is atomic for its run; racing callbacks for
//! the same run are resolved last write wins.

use chrono::Utc;
use dashmap::DashMap;
use loginlab_common::{
    ArtifactStore, ClearReport, Error, IncrementalUpdate, Result, Run, RunDetails, RunMeta,
    RunStatus, RunUpdate, ScenarioCatalog, Step, TerminalComplete, TestSelection,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound for list queries
pub const MAX_LIST_LIMIT: usize = 500;

pub const DISPATCH_FAILURE_STEP: &str = "Trigger runner";
pub const DEADLINE_STEP: &str = "Run deadline exceeded";

/// Keyed storage for run records
pub trait RunStore: Send + Sync {
    fn insert(&self, run: Run);

    fn get(&self, id: &str) -> Option<Run>;

    /// Apply `f` to the stored run while holding its lock
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Run)) -> Option<Run>;

    fn all(&self) -> Vec<Run>;

    /// Remove every record, returning the removed ids
    fn drain(&self) -> Vec<String>;
}

/// In-memory store; nothing survives a restart
#[derive(Default)]
pub struct MemoryRunStore {
    runs: DashMap<String, Run>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn insert(&self, run: Run) {
        self.runs.insert(run.id.clone(), run);
    }

    fn get(&self, id: &str) -> Option<Run> {
        self.runs.get(id).map(|r| r.value().clone())
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Run)) -> Option<Run> {
        let mut entry = self.runs.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    fn all(&self) -> Vec<Run> {
        self.runs.iter().map(|r| r.value().clone()).collect()
    }

    fn drain(&self) -> Vec<String> {
        let ids: Vec<String> = self.runs.iter().map(|r| r.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.runs.remove(&id).map(|(id, _)| id))
            .collect()
    }
}

/// Run lifecycle service
pub struct RunRegistry {
    store: Arc<dyn RunStore>,
    catalog: Arc<ScenarioCatalog>,
    artifacts: ArtifactStore,
}

impl RunRegistry {
    pub fn new(store: Arc<dyn RunStore>, catalog: Arc<ScenarioCatalog>, artifacts: ArtifactStore) -> Self {
        Self {
            store,
            catalog,
            artifacts,
        }
    }

    /// Registry over a fresh in-memory store
    pub fn in_memory(catalog: Arc<ScenarioCatalog>, artifacts: ArtifactStore) -> Self {
        Self::new(Arc::new(MemoryRunStore::new()), catalog, artifacts)
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Register a new queued run
    pub fn create(&self, scenario_id: &str, selected_tests: TestSelection) -> Result<Run> {
        let scenario = self.catalog.require(scenario_id)?;

        let mut extra = Map::new();
        extra.insert("requested_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        extra.insert(
            "target_base_url".to_string(),
            Value::String(scenario.target_base_url.clone()),
        );

        let run = Run {
            id: uuid::Uuid::new_v4().to_string(),
            scenario_id: scenario.id.clone(),
            status: RunStatus::Queued,
            started_at: loginlab_common::now_epoch_secs(),
            finished_at: None,
            selected_tests,
            details: RunDetails {
                steps: Vec::new(),
                tests: Vec::new(),
                meta: RunMeta {
                    summary: Default::default(),
                    extra,
                },
            },
            artifacts: None,
        };

        self.store.insert(run.clone());
        info!(run_id = %run.id, scenario_id = %run.scenario_id, "Run created");
        Ok(run)
    }

    pub fn get(&self, id: &str) -> Result<Run> {
        self.store.get(id).ok_or_else(|| Error::run_not_found(id))
    }

    /// Fetch a run with its screenshot list reconciled against the artifact
    /// directory. Files on disk win when the scan finds any; otherwise the
    /// stored list stands.
    pub async fn fetch(&self, id: &str) -> Result<Run> {
        let mut run = self.get(id)?;
        match self.artifacts.scan_screenshots(id).await {
            Ok(found) if !found.is_empty() => {
                run.artifacts.get_or_insert_with(Default::default).screenshots = found;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(run_id = %id, error = %e, "Screenshot scan failed, using stored list");
            }
        }
        Ok(run)
    }

    /// Most recent runs first, at most `limit` (clamped to 1..=500)
    pub fn list(&self, limit: usize) -> Vec<Run> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let mut runs = self.store.all();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        runs.truncate(limit);
        runs
    }

    pub fn apply(&self, id: &str, update: RunUpdate) -> Result<Run> {
        match update {
            RunUpdate::Incremental(u) => self.apply_update(id, u),
            RunUpdate::Terminal(c) => self.complete(id, c),
        }
    }

    /// Merge a progress report. A terminal status is never overwritten.
    pub fn apply_update(&self, id: &str, update: IncrementalUpdate) -> Result<Run> {
        let mut update = Some(update);
        let run = self
            .store
            .update(id, &mut |run: &mut Run| {
                let Some(update) = update.take() else { return };

                if let Some(status) = update.status {
                    if run.is_terminal() {
                        debug!(run_id = %run.id, current = %run.status, ignored = %status, "Ignoring status on terminal run");
                    } else {
                        run.status = status;
                    }
                }
                if let Some(finished_at) = update.finished_at {
                    run.finished_at = Some(finished_at);
                }
                if let Some(patch) = update.details {
                    run.details.steps.extend(patch.steps);
                    if let Some(tests) = patch.tests {
                        run.details.tests = tests;
                    }
                    if let Some(meta) = patch.meta {
                        merge_meta(&mut run.details.meta.extra, meta);
                    }
                }
                if let Some(artifacts) = update.artifacts {
                    run.artifacts = Some(artifacts);
                }
                run.details.refresh_summary();
            })
            .ok_or_else(|| Error::run_not_found(id))?;

        debug!(run_id = %id, status = %run.status, "Applied incremental update");
        Ok(run)
    }

    /// Replace the run's terminal fields. Repeated completions overwrite.
    pub fn complete(&self, id: &str, complete: TerminalComplete) -> Result<Run> {
        let mut complete = Some(complete);
        let run = self
            .store
            .update(id, &mut |run: &mut Run| {
                let Some(complete) = complete.take() else { return };

                if let Some(details) = complete.details {
                    let mut extra = Map::new();
                    merge_meta(&mut extra, details.meta);
                    run.details = RunDetails {
                        steps: details.steps,
                        tests: details.tests,
                        meta: RunMeta {
                            summary: Default::default(),
                            extra,
                        },
                    };
                }
                run.details.refresh_summary();

                run.status = match complete.status {
                    Some(status) if status.is_terminal() => status,
                    _ if run.details.has_failures() => RunStatus::Fail,
                    _ => RunStatus::Pass,
                };
                run.finished_at = Some(loginlab_common::now_epoch_secs());

                if let Some(artifacts) = complete.artifacts {
                    run.artifacts = Some(artifacts);
                }
            })
            .ok_or_else(|| Error::run_not_found(id))?;

        info!(run_id = %id, status = %run.status, summary = ?run.details.meta.summary, "Run completed");
        Ok(run)
    }

    /// Record a failure to hand the run to the runner
    pub fn fail_dispatch(&self, id: &str, error: &str) -> Result<Run> {
        let (run, failed) = self.fail_unless_terminal(id, Step::fail(DISPATCH_FAILURE_STEP, error))?;
        if failed {
            warn!(run_id = %id, error, "Dispatch failed");
        }
        Ok(run)
    }

    /// Fail every non-terminal run started more than `max_age_secs` before `now`
    pub fn reap_expired(&self, now: i64, max_age_secs: i64) -> Vec<String> {
        let expired: Vec<String> = self
            .store
            .all()
            .into_iter()
            .filter(|run| !run.is_terminal() && now - run.started_at > max_age_secs)
            .map(|run| run.id)
            .collect();

        let mut reaped = Vec::new();
        for id in expired {
            let step = Step::fail(
                DEADLINE_STEP,
                format!("no terminal report within {}s", max_age_secs),
            );
            match self.fail_unless_terminal(&id, step) {
                Ok((_, true)) => {
                    warn!(run_id = %id, "Run exceeded its deadline");
                    reaped.push(id);
                }
                Ok((_, false)) => {}
                Err(e) => debug!(run_id = %id, error = %e, "Run vanished before reaping"),
            }
        }
        reaped
    }

    /// Returns the run and whether this call failed it
    fn fail_unless_terminal(&self, id: &str, step: Step) -> Result<(Run, bool)> {
        let mut step = Some(step);
        let mut failed = false;
        let run = self
            .store
            .update(id, &mut |run: &mut Run| {
                if run.is_terminal() {
                    return;
                }
                run.status = RunStatus::Fail;
                run.finished_at = Some(loginlab_common::now_epoch_secs());
                if let Some(step) = step.take() {
                    run.details.steps.push(step);
                }
                failed = true;
            })
            .ok_or_else(|| Error::run_not_found(id))?;
        Ok((run, failed))
    }

    /// Remove every run record, then delete each run's artifact directory.
    /// Individual deletion failures are counted, never fatal.
    pub async fn clear(&self) -> ClearReport {
        let ids = self.store.drain();
        let mut report = ClearReport {
            runs_removed: ids.len(),
            ..Default::default()
        };

        for id in &ids {
            match self.artifacts.remove_run_dir(id).await {
                Ok(true) => report.dirs_deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(run_id = %id, error = %e, "Failed to delete run artifacts");
                    report.errors += 1;
                }
            }
        }

        info!(
            runs_removed = report.runs_removed,
            dirs_deleted = report.dirs_deleted,
            errors = report.errors,
            "Cleared runs"
        );
        report
    }
}

/// Shallow merge; `summary` is always derived, never taken from a caller
fn merge_meta(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if key != "summary" {
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loginlab_common::{CompletionDetails, DetailsPatch, Summary, TestResult, TestStatus};
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> RunRegistry {
        RunRegistry::in_memory(
            Arc::new(ScenarioCatalog::builtin()),
            ArtifactStore::new(tmp.path()),
        )
    }

    fn result(title: &str, status: &str) -> TestResult {
        TestResult {
            title: title.to_string(),
            status: TestStatus::from(status),
            duration_ms: 10,
            error: None,
        }
    }

    #[test]
    fn test_create_is_queued_with_unique_ids() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        let a = reg.create("s-basic-0001", TestSelection::All).unwrap();
        let b = reg.create("s-basic-0001", TestSelection::All).unwrap();
        assert_eq!(a.status, RunStatus::Queued);
        assert_ne!(a.id, b.id);
        assert!(a.finished_at.is_none());
        assert_eq!(
            a.details.meta.extra.get("target_base_url"),
            Some(&json!("http://mock-app-basic:51010"))
        );
        assert!(a.details.meta.extra.contains_key("requested_at"));
    }

    #[test]
    fn test_create_unknown_scenario_registers_nothing() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        assert!(matches!(
            reg.create("s-missing", TestSelection::All),
            Err(Error::UnknownScenario(_))
        ));
        assert!(reg.list(50).is_empty());
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            registry(&tmp).get("nope"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_recomputes_summary_and_ignores_stale_one() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();

        let mut meta = Map::new();
        meta.insert("summary".to_string(), json!({"pass": 9, "fail": 9, "total": 9}));
        meta.insert("base_url".to_string(), json!("http://x"));

        let updated = reg
            .apply_update(
                &run.id,
                IncrementalUpdate {
                    details: Some(DetailsPatch {
                        steps: vec![Step::pass("Runner accepted job")],
                        tests: Some(vec![
                            result("a", "pass"),
                            result("b", "fail"),
                            result("c", "pass"),
                        ]),
                        meta: Some(meta),
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(
            updated.details.meta.summary,
            Summary {
                pass: 2,
                fail: 1,
                total: 3
            }
        );
        assert_eq!(updated.details.meta.extra.get("base_url"), Some(&json!("http://x")));
        assert!(updated.details.meta.extra.contains_key("target_base_url"));
        assert_eq!(updated.details.steps.len(), 1);
    }

    #[test]
    fn test_steps_append_across_updates() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();

        reg.apply_update(&run.id, IncrementalUpdate::accepted()).unwrap();
        let run = reg.apply_update(&run.id, IncrementalUpdate::accepted()).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.details.steps.len(), 2);
    }

    #[test]
    fn test_terminal_status_is_sticky_for_updates() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();

        reg.complete(
            &run.id,
            TerminalComplete {
                status: Some(RunStatus::Pass),
                ..Default::default()
            },
        )
        .unwrap();

        let after = reg.apply_update(&run.id, IncrementalUpdate::accepted()).unwrap();
        assert_eq!(after.status, RunStatus::Pass);

        let after = reg.fail_dispatch(&run.id, "connection refused").unwrap();
        assert_eq!(after.status, RunStatus::Pass);
        assert!(after.details.steps.iter().all(|s| s.name != DISPATCH_FAILURE_STEP));
    }

    #[test]
    fn test_complete_replaces_details_and_derives_status() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();
        reg.apply_update(&run.id, IncrementalUpdate::accepted()).unwrap();

        let done = reg
            .complete(
                &run.id,
                TerminalComplete {
                    status: None,
                    details: Some(CompletionDetails {
                        steps: vec![],
                        tests: vec![result("a", "pass"), result("b", "fail")],
                        meta: Map::new(),
                    }),
                    artifacts: None,
                },
            )
            .unwrap();

        assert_eq!(done.status, RunStatus::Fail);
        assert!(done.details.steps.is_empty());
        assert_eq!(done.details.meta.summary.total, 2);
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn test_complete_is_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();

        let pass = TerminalComplete {
            status: Some(RunStatus::Pass),
            ..Default::default()
        };
        let fail = TerminalComplete {
            status: Some(RunStatus::Fail),
            ..Default::default()
        };
        reg.complete(&run.id, pass).unwrap();
        assert_eq!(reg.complete(&run.id, fail).unwrap().status, RunStatus::Fail);
    }

    #[test]
    fn test_fail_dispatch_adds_step() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();

        let failed = reg.fail_dispatch(&run.id, "connection refused").unwrap();
        assert_eq!(failed.status, RunStatus::Fail);
        assert!(failed.finished_at.is_some());
        assert_eq!(failed.details.steps[0].name, DISPATCH_FAILURE_STEP);
        assert_eq!(failed.details.steps[0].error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_list_orders_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryRunStore::new());
        let reg = RunRegistry::new(
            store.clone(),
            Arc::new(ScenarioCatalog::builtin()),
            ArtifactStore::new(tmp.path()),
        );

        for (i, started_at) in [100, 300, 200].into_iter().enumerate() {
            let mut run = reg.create("s-basic-0001", TestSelection::All).unwrap();
            run.id = format!("run-{}", i);
            run.started_at = started_at;
            store.insert(run);
        }

        let listed: Vec<i64> = reg
            .list(50)
            .into_iter()
            .filter(|r| r.id.starts_with("run-"))
            .map(|r| r.started_at)
            .collect();
        assert_eq!(listed, vec![300, 200, 100]);
        assert_eq!(reg.list(0).len(), 1);
    }

    #[test]
    fn test_reap_expired_fails_stuck_runs() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let stuck = reg.create("s-basic-0001", TestSelection::All).unwrap();
        let fresh = reg.create("s-basic-0001", TestSelection::All).unwrap();
        reg.complete(
            &fresh.id,
            TerminalComplete {
                status: Some(RunStatus::Pass),
                ..Default::default()
            },
        )
        .unwrap();

        let reaped = reg.reap_expired(stuck.started_at + 1000, 60);
        assert_eq!(reaped, vec![stuck.id.clone()]);

        let run = reg.get(&stuck.id).unwrap();
        assert_eq!(run.status, RunStatus::Fail);
        assert_eq!(run.details.steps.last().unwrap().name, DEADLINE_STEP);
        assert_eq!(reg.get(&fresh.id).unwrap().status, RunStatus::Pass);
    }

    #[tokio::test]
    async fn test_clear_removes_records_and_dirs() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let with_dir = reg.create("s-basic-0001", TestSelection::All).unwrap();
        let without_dir = reg.create("s-basic-0001", TestSelection::All).unwrap();
        reg.artifacts().prepare_run(&with_dir.id).await.unwrap();

        let report = reg.clear().await;
        assert_eq!(
            report,
            ClearReport {
                runs_removed: 2,
                dirs_deleted: 1,
                errors: 0
            }
        );
        assert!(reg.list(50).is_empty());
        assert!(reg.get(&with_dir.id).is_err());
        assert!(reg.get(&without_dir.id).is_err());
        assert!(!reg.artifacts().run_dir(&with_dir.id).exists());
    }

    #[tokio::test]
    async fn test_fetch_prefers_screenshots_on_disk() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let run = reg.create("s-basic-0001", TestSelection::All).unwrap();

        let stored = loginlab_common::Artifacts {
            screenshots: vec![loginlab_common::artifact::screenshot_descriptor(
                &run.id,
                "old.png".to_string(),
            )],
            ..Default::default()
        };
        reg.apply_update(
            &run.id,
            IncrementalUpdate {
                artifacts: Some(stored),
                ..Default::default()
            },
        )
        .unwrap();

        // Empty directory keeps the stored list
        reg.artifacts().prepare_run(&run.id).await.unwrap();
        let fetched = reg.fetch(&run.id).await.unwrap();
        assert_eq!(fetched.stored_screenshots()[0].name, "old.png");

        tokio::fs::write(
            reg.artifacts().screenshots_dir(&run.id).join("1_new_all.png"),
            b"png",
        )
        .await
        .unwrap();
        let fetched = reg.fetch(&run.id).await.unwrap();
        let names: Vec<&str> = fetched
            .stored_screenshots()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["1_new_all.png"]);
    }
}
