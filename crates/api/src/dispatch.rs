//! Job dispatch to the runner
//!
//! Submissions are queued on a channel and delivered by a background loop,
//! so the client response never waits on the runner. A delivery that fails
//! marks the run failed with a diagnostic step.

use crate::registry::RunRegistry;
use async_trait::async_trait;
use loginlab_common::{DispatchAck, DispatchRequest, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delivers a job to an execution plane
#[async_trait]
pub trait RunnerTransport: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAck>;
}

/// Posts jobs as JSON to `{runner_url}/execute`
pub struct HttpRunnerTransport {
    client: reqwest::Client,
    runner_url: String,
}

impl HttpRunnerTransport {
    pub fn new(runner_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            client,
            runner_url: runner_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RunnerTransport for HttpRunnerTransport {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAck> {
        let url = format!("{}/execute", self.runner_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "runner returned {}: {}",
                status,
                body.trim()
            )));
        }

        response
            .json::<DispatchAck>()
            .await
            .map_err(|e| Error::Transport(format!("invalid runner acknowledgement: {}", e)))
    }
}

/// Handle for queueing jobs
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchRequest>,
}

impl Dispatcher {
    /// Spawn the delivery loop. It runs until every `Dispatcher` clone is dropped.
    pub fn start(
        registry: Arc<RunRegistry>,
        transport: Arc<dyn RunnerTransport>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<DispatchRequest>();

        let handle = tokio::spawn(async move {
            info!("Dispatcher started");
            while let Some(request) = rx.recv().await {
                let registry = registry.clone();
                let transport = transport.clone();
                tokio::spawn(async move {
                    deliver(&registry, transport.as_ref(), request).await;
                });
            }
            info!("Dispatcher stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a job; returns immediately
    pub fn submit(&self, request: DispatchRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| Error::Transport("dispatcher is not running".to_string()))
    }
}

async fn deliver(registry: &RunRegistry, transport: &dyn RunnerTransport, request: DispatchRequest) {
    let run_id = request.run_id.clone();
    debug!(run_id = %run_id, scenario_id = %request.scenario_id, "Dispatching run");

    let error = match transport.dispatch(&request).await {
        Ok(ack) if ack.accepted => {
            info!(run_id = %run_id, "Runner accepted job");
            return;
        }
        Ok(_) => "runner declined the job".to_string(),
        Err(e) => e.to_string(),
    };

    if let Err(e) = registry.fail_dispatch(&run_id, &error) {
        warn!(run_id = %run_id, error = %e, "Could not record dispatch failure");
    }
}
