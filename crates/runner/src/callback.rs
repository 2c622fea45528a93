//! Status callbacks to the control plane

use async_trait::async_trait;
use loginlab_common::RunUpdate;
use std::time::Duration;
use tracing::debug;

use crate::error::RunnerResult;

/// Sends run updates to the control plane
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, run_id: &str, update: &RunUpdate) -> RunnerResult<()>;
}

/// Posts updates to `{api}/runs/{id}/update` and `{api}/runs/{id}/complete`
pub struct HttpStatusReporter {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpStatusReporter {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> RunnerResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint_url(&self, run_id: &str, update: &RunUpdate) -> String {
        format!("{}/runs/{}/{}", self.api_base_url, run_id, update.endpoint())
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, run_id: &str, update: &RunUpdate) -> RunnerResult<()> {
        let url = self.endpoint_url(run_id, update);
        let request = match update {
            RunUpdate::Incremental(body) => self.client.post(&url).json(body),
            RunUpdate::Terminal(body) => self.client.post(&url).json(body),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(loginlab_common::Error::Transport(format!(
                "POST {} returned {}: {}",
                url,
                status,
                body.trim()
            ))
            .into());
        }

        debug!(run_id, endpoint = update.endpoint(), "Reported run update");
        Ok(())
    }
}
