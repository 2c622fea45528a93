//! Control plane configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Control plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP listen address
    pub listen: String,

    /// Base URL of the runner
    pub runner_url: String,

    /// Artifact root, shared with the runner
    pub artifacts_dir: PathBuf,

    /// Timeout for one dispatch request
    pub dispatch_timeout_secs: u64,

    /// Deadline sent with every job
    pub job_deadline_secs: u64,

    /// Extra time a run may stay non-terminal past its deadline
    pub reaper_grace_secs: u64,

    pub reaper_interval_secs: u64,

    /// Optional TOML scenario catalog; built-in scenarios otherwise
    pub catalog_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:41010".to_string(),
            runner_url: "http://127.0.0.1:42010".to_string(),
            artifacts_dir: loginlab_common::default_artifacts_dir(),
            dispatch_timeout_secs: 10,
            job_deadline_secs: 900,
            reaper_grace_secs: 60,
            reaper_interval_secs: 30,
            catalog_path: None,
        }
    }
}

impl ApiConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `LOGINLAB_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = lookup("LOGINLAB_API_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = lookup("LOGINLAB_RUNNER_URL") {
            self.runner_url = v;
        }
        if let Some(v) = lookup("LOGINLAB_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(v);
        }
    }

    /// Age after which a non-terminal run is failed by the reaper
    pub fn reaper_max_age_secs(&self) -> i64 {
        (self.job_deadline_secs + self.reaper_grace_secs) as i64
    }
}
