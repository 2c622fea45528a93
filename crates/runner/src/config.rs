//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::playwright::PlaywrightConfig;

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// HTTP listen address
    pub listen: String,

    /// Control plane base URL for status callbacks
    pub api_base_url: String,

    /// Artifact root, shared with the control plane
    pub artifacts_dir: PathBuf,

    /// Directory of YAML suites
    pub suites_dir: PathBuf,

    /// Jobs executed at the same time
    pub concurrency: usize,

    /// Deadline for jobs that do not carry one
    pub default_deadline_secs: u64,

    pub callback_timeout_secs: u64,

    /// Browser automation settings
    pub browser: PlaywrightConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:42010".to_string(),
            api_base_url: "http://127.0.0.1:41010".to_string(),
            artifacts_dir: loginlab_common::default_artifacts_dir(),
            suites_dir: PathBuf::from("suites"),
            concurrency: 1,
            default_deadline_secs: 900,
            callback_timeout_secs: 10,
            browser: PlaywrightConfig::default(),
        }
    }
}

impl RunnerConfig {
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
        if let Some(v) = lookup("LOGINLAB_RUNNER_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = lookup("LOGINLAB_API_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("LOGINLAB_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOGINLAB_SUITES_DIR") {
            self.suites_dir = PathBuf::from(v);
        }
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_secs(self.default_deadline_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playwright::Browser;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = RunnerConfig::load(Path::new("/nonexistent/loginlab-runner.toml")).unwrap();
        assert_eq!(config.listen, "0.0.0.0:42010");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.default_deadline(), Duration::from_secs(900));
        assert!(config.browser.headless);
    }

    #[test]
    fn test_nested_browser_table() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "concurrency = 2\n\n[browser]\nbrowser = \"firefox\"\nheadless = false\n",
        )
        .unwrap();
        let config = RunnerConfig::load(tmp.path()).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.browser.browser, Browser::Firefox);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.viewport_width, 1280);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RunnerConfig::default();
        config.apply_overrides(|key| match key {
            "LOGINLAB_API_URL" => Some("http://api:41010".to_string()),
            "LOGINLAB_SUITES_DIR" => Some("/opt/suites".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://api:41010");
        assert_eq!(config.suites_dir, PathBuf::from("/opt/suites"));
        assert_eq!(config.listen, "0.0.0.0:42010");
    }
}
