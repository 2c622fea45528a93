//! Deadline reaper
//!
//! Periodically fails runs that never received a terminal report, so a
//! crashed or unreachable runner cannot leave a run `running` forever.

use crate::registry::RunRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Reaper {
    registry: Arc<RunRegistry>,
    interval: Duration,
    /// Job deadline plus grace period
    max_age_secs: i64,
}

impl Reaper {
    pub fn new(registry: Arc<RunRegistry>, interval: Duration, max_age_secs: i64) -> Self {
        Self {
            registry,
            interval,
            max_age_secs,
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age_secs,
            "Reaper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        info!("Reaper stopped");
    }

    /// One pass over the registry; returns the ids that were failed
    pub fn sweep(&self) -> Vec<String> {
        let reaped = self
            .registry
            .reap_expired(loginlab_common::now_epoch_secs(), self.max_age_secs);
        if !reaped.is_empty() {
            info!(count = reaped.len(), "Reaped expired runs");
        } else {
            debug!("No expired runs");
        }
        reaped
    }
}
