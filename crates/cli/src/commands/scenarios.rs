//! Scenario catalog command

use anyhow::Result;
use loginlab_common::Scenario;
use serde::Serialize;

use crate::client::ApiClient;
use crate::output::{print_list, OutputFormat, TableDisplay};

/// Scenario display wrapper for serialization
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub target_base_url: String,
    pub tests: Vec<String>,
}

impl From<Scenario> for ScenarioDisplay {
    fn from(s: Scenario) -> Self {
        Self {
            id: s.id,
            kind: s.kind,
            title: s.title,
            target_base_url: s.target_base_url,
            tests: s.tests,
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Type", "Title", "Target", "Tests"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.kind.clone(),
            self.title.clone(),
            self.target_base_url.clone(),
            self.tests.join("\n"),
        ]
    }
}

pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let scenarios: Vec<ScenarioDisplay> = client
        .scenarios()
        .await?
        .into_iter()
        .map(ScenarioDisplay::from)
        .collect();
    print_list(&scenarios, format)
}
