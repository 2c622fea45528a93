//! Declarative YAML test suites
//!
//! A suite groups the test cases of one scenario. Each case is an ordered
//! list of browser steps executed in a fresh session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RunnerError, RunnerResult};

/// A suite file parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    /// Scenario this suite belongs to
    pub scenario_id: String,

    /// Suite title, shown as the parent of its tests in reports
    pub title: String,

    /// Order among the scenario's suites; lower runs first
    #[serde(default)]
    pub order: u32,

    pub tests: Vec<TestCase>,
}

/// One test: a title and its steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub title: String,
    pub steps: Vec<TestStep>,
}

/// A single browser step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a path relative to the target base URL
    Navigate { url: String },

    /// Type into an input field
    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        clear_first: bool,
    },

    /// Click an element
    Click { selector: String },

    /// Wait for an element to be attached
    Wait {
        selector: String,
        #[serde(default = "default_timeout")]
        timeout_ms: u64,
    },

    /// Wait for an element and check that its text contains a fragment
    AssertText {
        selector: String,
        contains: String,
        #[serde(default = "default_timeout")]
        timeout_ms: u64,
    },

    /// Store an attribute value under `key` for a later comparison
    Remember {
        selector: String,
        attribute: String,
        key: String,
    },

    /// Check that an attribute still equals a remembered value
    AssertRemembered {
        selector: String,
        attribute: String,
        key: String,
    },

    /// Run nested steps several times
    Repeat { times: u32, steps: Vec<TestStep> },

    /// Fixed pause (use sparingly)
    Sleep { ms: u64 },
}

fn default_timeout() -> u64 {
    5000
}

impl TestStep {
    /// Short label for logs and error messages
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate:{}", url),
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Click { selector } => format!("click:{}", selector),
            TestStep::Wait { selector, .. } => format!("wait:{}", selector),
            TestStep::AssertText { selector, .. } => format!("assert_text:{}", selector),
            TestStep::Remember { key, .. } => format!("remember:{}", key),
            TestStep::AssertRemembered { key, .. } => format!("assert_remembered:{}", key),
            TestStep::Repeat { times, .. } => format!("repeat:{}", times),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
        }
    }

    /// Expand `repeat` blocks into a flat step list
    pub fn flatten(steps: &[TestStep]) -> Vec<TestStep> {
        let mut out = Vec::new();
        for step in steps {
            match step {
                TestStep::Repeat { times, steps } => {
                    for _ in 0..*times {
                        out.extend(Self::flatten(steps));
                    }
                }
                other => out.push(other.clone()),
            }
        }
        out
    }
}

impl TestSuite {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| RunnerError::SuiteParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Title of `test` prefixed with this suite's title, as reports show it
    pub fn full_title(&self, test: &str) -> String {
        full_title(&self.title, test)
    }
}

/// Join a suite title and a test title
pub fn full_title(suite: &str, test: &str) -> String {
    if suite.is_empty() {
        test.to_string()
    } else {
        format!("{} {}", suite, test)
    }
}

/// Scenario id to ordered suite files
#[derive(Debug, Clone, Default)]
pub struct SuiteMap {
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl SuiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite file for a scenario
    pub fn insert(&mut self, scenario_id: impl Into<String>, path: impl Into<PathBuf>) {
        self.files
            .entry(scenario_id.into())
            .or_default()
            .push(path.into());
    }

    /// Index every `*.yaml`/`*.yml` suite under `dir`
    pub fn discover(dir: &Path) -> RunnerResult<Self> {
        let mut found: Vec<(String, u32, PathBuf)> = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let suite = TestSuite::from_file(entry.path())?;
            debug!(
                "Found suite '{}' for {} at {}",
                suite.title,
                suite.scenario_id,
                entry.path().display()
            );
            found.push((suite.scenario_id, suite.order, entry.path().to_path_buf()));
        }

        // Stable sort keeps file name order for equal `order` values
        found.sort_by_key(|(_, order, _)| *order);

        let mut map = Self::new();
        for (scenario_id, _, path) in found {
            map.insert(scenario_id, path);
        }

        info!(
            "Indexed {} scenario(s) from {}",
            map.files.len(),
            dir.display()
        );
        Ok(map)
    }

    /// Suite files of a scenario, in execution order
    pub fn resolve(&self, scenario_id: &str) -> RunnerResult<&[PathBuf]> {
        self.files
            .get(scenario_id)
            .map(|v| v.as_slice())
            .ok_or_else(|| loginlab_common::Error::UnknownScenario(scenario_id.to_string()).into())
    }

    /// Load the suites of a scenario
    pub fn load(&self, scenario_id: &str) -> RunnerResult<Vec<TestSuite>> {
        self.resolve(scenario_id)?
            .iter()
            .map(|path| TestSuite::from_file(path))
            .collect()
    }

    pub fn scenario_ids(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASIC: &str = r#"
scenario_id: s-basic-0001
title: Basic Login
tests:
  - title: Basic - empty fields show validation
    steps:
      - action: navigate
        url: /
      - action: click
        selector: button
      - action: assert_text
        selector: "[data-testid='error']"
        contains: Missing
"#;

    #[test]
    fn test_parse_suite() {
        let suite = TestSuite::from_yaml(BASIC).unwrap();
        assert_eq!(suite.scenario_id, "s-basic-0001");
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(suite.tests[0].steps.len(), 3);
        assert_eq!(
            suite.tests[0].steps[2],
            TestStep::AssertText {
                selector: "[data-testid='error']".to_string(),
                contains: "Missing".to_string(),
                timeout_ms: 5000,
            }
        );
    }

    #[test]
    fn test_flatten_repeat() {
        let steps = vec![
            TestStep::Navigate { url: "/reset".to_string() },
            TestStep::Repeat {
                times: 3,
                steps: vec![
                    TestStep::Navigate { url: "/".to_string() },
                    TestStep::Click { selector: "button".to_string() },
                ],
            },
        ];
        let flat = TestStep::flatten(&steps);
        assert_eq!(flat.len(), 7);
        assert!(flat.iter().all(|s| !matches!(s, TestStep::Repeat { .. })));
    }

    #[test]
    fn test_discover_and_resolve() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("basic.yaml"), BASIC).unwrap();
        std::fs::write(tmp.path().join("README.md"), "not a suite").unwrap();

        let map = SuiteMap::discover(tmp.path()).unwrap();
        assert_eq!(map.resolve("s-basic-0001").unwrap().len(), 1);
        assert_eq!(map.load("s-basic-0001").unwrap()[0].title, "Basic Login");
        assert!(matches!(
            map.resolve("s-unknown"),
            Err(RunnerError::Common(loginlab_common::Error::UnknownScenario(_)))
        ));
    }

    #[test]
    fn test_bundled_suites_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../suites");
        let map = SuiteMap::discover(&dir).unwrap();
        let catalog = loginlab_common::ScenarioCatalog::builtin();

        for scenario in catalog.all() {
            let suites = map.load(&scenario.id).unwrap();
            let titles: Vec<&str> = suites
                .iter()
                .flat_map(|s| s.tests.iter().map(|t| t.title.as_str()))
                .collect();
            assert_eq!(titles, scenario.tests, "suite titles for {}", scenario.id);
        }
    }
}
