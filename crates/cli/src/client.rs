//! Control plane HTTP client

use anyhow::{bail, Context, Result};
use loginlab_common::{
    ClearReport, ListRunsResponse, Run, RunDiffReport, Scenario, ScenariosResponse,
    SubmitRunRequest, TestSelection,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Client for the LoginLab API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a JSON response, surfacing the server's `{error}` body on failure
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(body);
            bail!("API returned {}: {}", status, message.trim());
        }
        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("cannot reach API at {}", self.base_url))?;
        Self::decode(response).await
    }

    /// Check if the API is healthy
    pub async fn health_check(&self) -> bool {
        self.get::<serde_json::Value>("/health")
            .await
            .map(|v| v.get("ok").and_then(|ok| ok.as_bool()) == Some(true))
            .unwrap_or(false)
    }

    pub async fn scenarios(&self) -> Result<Vec<Scenario>> {
        Ok(self.get::<ScenariosResponse>("/api/scenarios").await?.scenarios)
    }

    /// Submit a run; an empty title list means every test
    pub async fn submit(&self, scenario_id: &str, tests: Vec<String>) -> Result<Run> {
        let request = SubmitRunRequest {
            scenario_id: Some(scenario_id.to_string()),
            tests: if tests.is_empty() {
                TestSelection::All
            } else {
                TestSelection::Titles(tests)
            },
        };
        debug!("POST /runs");
        let response = self
            .http
            .post(self.url("/runs"))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("cannot reach API at {}", self.base_url))?;
        Self::decode(response).await
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<Run>> {
        Ok(self
            .get::<ListRunsResponse>(&format!("/runs?limit={}", limit))
            .await?
            .runs)
    }

    pub async fn get_run(&self, id: &str) -> Result<Run> {
        self.get(&format!("/runs/{}", id)).await
    }

    pub async fn diff(&self, a: &str, b: &str) -> Result<RunDiffReport> {
        self.get(&format!("/runs/{}/diff/{}", a, b)).await
    }

    pub async fn clear(&self) -> Result<ClearReport> {
        debug!("DELETE /runs");
        let response = self
            .http
            .delete(self.url("/runs"))
            .send()
            .await
            .with_context(|| format!("cannot reach API at {}", self.base_url))?;
        Self::decode(response).await
    }
}

/// Outcome of waiting for a run
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub run: Run,
    /// Polls made before the final refresh
    pub polls: u32,
    pub terminal: bool,
}

/// Poll `fetch` every `interval` until the run is terminal or `max_polls`
/// attempts are used up, then fetch once more unconditionally. The final
/// refresh is returned even when it is still not terminal.
pub async fn poll_until_terminal<F, Fut>(
    mut fetch: F,
    interval: Duration,
    max_polls: u32,
    mut on_poll: impl FnMut(&Run),
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Run>>,
{
    for attempt in 1..=max_polls {
        tokio::time::sleep(interval).await;
        let run = fetch().await?;
        on_poll(&run);
        if run.is_terminal() {
            return Ok(PollOutcome {
                run,
                polls: attempt,
                terminal: true,
            });
        }
    }

    let run = fetch().await?;
    let terminal = run.is_terminal();
    Ok(PollOutcome {
        run,
        polls: max_polls,
        terminal,
    })
}
