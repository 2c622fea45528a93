//! Run artifact layout
//!
//! Every run owns a directory under `<root>/runs/<id>/`:
//! - `screenshots/*.png`: `*_fail.png` failure captures and `*_all.png` audit captures
//! - `report/index.json` and `report/index.html`: the nested result tree
//!
//! The same tree is served read-only under the `/artifacts` URL prefix.

use crate::types::{Screenshot, ScreenshotKind};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// URL prefix the artifact root is served under
pub const ARTIFACTS_URL_PREFIX: &str = "/artifacts";

const MAX_SAFE_NAME_LEN: usize = 180;

/// Filesystem view of the artifact root
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_id)
    }

    pub fn screenshots_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("screenshots")
    }

    pub fn report_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("report")
    }

    pub fn report_json(&self, run_id: &str) -> PathBuf {
        self.report_dir(run_id).join("index.json")
    }

    pub fn report_html(&self, run_id: &str) -> PathBuf {
        self.report_dir(run_id).join("index.html")
    }

    /// Create the screenshot and report directories of a run
    pub async fn prepare_run(&self, run_id: &str) -> Result<PathBuf> {
        check_run_id(run_id)?;
        fs::create_dir_all(self.screenshots_dir(run_id)).await?;
        fs::create_dir_all(self.report_dir(run_id)).await?;
        debug!(run_id, "Prepared artifact directories");
        Ok(self.run_dir(run_id))
    }

    /// List the screenshots currently on disk for a run, sorted by name.
    ///
    /// A missing directory is an empty list, not an error.
    pub async fn scan_screenshots(&self, run_id: &str) -> Result<Vec<Screenshot>> {
        check_run_id(run_id)?;
        let dir = self.screenshots_dir(run_id);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.to_ascii_lowercase().ends_with(".png") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| screenshot_descriptor(run_id, name))
            .collect())
    }

    /// Delete a run's artifact directory. Returns whether anything was removed.
    pub async fn remove_run_dir(&self, run_id: &str) -> Result<bool> {
        check_run_id(run_id)?;
        let dir = self.run_dir(run_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(run_id, "Deleted artifact directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::ArtifactCleanup {
                id: run_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Run ids become path components; refuse anything that could escape the root
fn check_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty()
        || run_id == "."
        || run_id == ".."
        || run_id.contains(['/', '\\', '\0'])
    {
        return Err(Error::InvalidConfig(format!("invalid run id: {:?}", run_id)));
    }
    Ok(())
}

pub fn screenshot_url(run_id: &str, name: &str) -> String {
    format!("{}/runs/{}/screenshots/{}", ARTIFACTS_URL_PREFIX, run_id, name)
}

pub fn report_url(run_id: &str) -> String {
    format!("{}/runs/{}/report/index.html", ARTIFACTS_URL_PREFIX, run_id)
}

pub fn screenshot_descriptor(run_id: &str, name: String) -> Screenshot {
    Screenshot {
        url: screenshot_url(run_id, &name),
        kind: ScreenshotKind::from_file_name(&name),
        name,
    }
}

/// File name for a screenshot of `title` taken at `timestamp_ms`
pub fn screenshot_file_name(timestamp_ms: i64, title: &str, kind: ScreenshotKind) -> String {
    format!("{}_{}{}.png", timestamp_ms, safe_name(title), kind.suffix())
}

/// Make a test title usable as a file name component
pub fn safe_name(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .take(MAX_SAFE_NAME_LEN)
        .collect()
}
