//! Run inspection commands

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use loginlab_common::{Run, RunDiffReport, StepStatus};
use serde::Serialize;

use crate::client::ApiClient;
use crate::output::{
    format_epoch, new_table, print_list, print_structured, print_success, print_warning,
    run_status, test_status, OutputFormat, TableDisplay,
};

#[derive(Args)]
pub struct ListArgs {
    /// Maximum number of runs to show
    #[arg(short, long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Run ID
    pub id: String,
}

#[derive(Args)]
pub struct DiffArgs {
    /// First run ID
    pub a: String,
    /// Second run ID
    pub b: String,
}

/// Run display wrapper for serialization
#[derive(Serialize)]
pub struct RunDisplay {
    pub id: String,
    pub scenario_id: String,
    pub status: String,
    pub started: String,
    pub duration_secs: Option<i64>,
    pub pass: usize,
    pub fail: usize,
    pub total: usize,
}

impl From<&Run> for RunDisplay {
    fn from(run: &Run) -> Self {
        let summary = run.details.meta.summary;
        Self {
            id: run.id.clone(),
            scenario_id: run.scenario_id.clone(),
            status: run.status.to_string(),
            started: format_epoch(run.started_at),
            duration_secs: run.duration_secs(),
            pass: summary.pass,
            fail: summary.fail,
            total: summary.total,
        }
    }
}

impl TableDisplay for RunDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Scenario", "Status", "Started", "Duration", "Pass", "Fail", "Total"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.scenario_id.clone(),
            self.status.clone(),
            self.started.clone(),
            self.duration_secs
                .map(|d| format!("{}s", d))
                .unwrap_or_else(|| "-".to_string()),
            self.pass.to_string(),
            self.fail.to_string(),
            self.total.to_string(),
        ]
    }
}

pub async fn list(args: ListArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let runs = client.list(args.limit).await?;
    let displays: Vec<RunDisplay> = runs.iter().map(RunDisplay::from).collect();
    print_list(&displays, format)
}

pub async fn show(args: ShowArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let run = client.get_run(&args.id).await?;
    print_run(&run, client.base_url(), format)
}

/// Print a run with its tests, step log and artifacts
pub fn print_run(run: &Run, api_url: &str, format: OutputFormat) -> Result<()> {
    if print_structured(run, format)? {
        return Ok(());
    }

    let summary = run.details.meta.summary;
    println!();
    println!("{}  {}", "Run".bold(), run.id);
    println!("   Scenario: {}", run.scenario_id);
    println!("   Status:   {}", run_status(run.status));
    println!("   Started:  {}", format_epoch(run.started_at));
    if let Some(duration) = run.duration_secs() {
        println!("   Duration: {}s", duration);
    }
    if let Some(count) = run.selected_tests.count() {
        println!("   Selected: {} test(s)", count);
    }
    println!(
        "   Summary:  {} passed, {} failed, {} total",
        summary.pass.to_string().green(),
        summary.fail.to_string().red(),
        summary.total
    );

    if !run.details.tests.is_empty() {
        println!();
        let mut table = new_table();
        table.set_header(vec!["Test", "Status", "Duration", "Error"]);
        for test in &run.details.tests {
            table.add_row(vec![
                test.title.clone(),
                test_status(&test.status).to_string(),
                format!("{}ms", test.duration_ms),
                test.error.clone().unwrap_or_default(),
            ]);
        }
        println!("{table}");
    }

    if !run.details.steps.is_empty() {
        println!();
        println!("{}", "Steps".bold());
        for step in &run.details.steps {
            let mark = match step.status {
                StepStatus::Pass => "✓".green(),
                StepStatus::Fail => "✗".red(),
            };
            match &step.error {
                Some(error) => println!("   {} {}: {}", mark, step.name, error.dimmed()),
                None => println!("   {} {}", mark, step.name),
            }
        }
    }

    if let Some(artifacts) = &run.artifacts {
        println!();
        println!("{}", "Artifacts".bold());
        if let Some(url) = &artifacts.report_url {
            println!("   Report: {}{}", api_url, url);
        }
        for shot in &artifacts.screenshots {
            println!("   • {}{} ({:?})", api_url, shot.url, shot.kind);
        }
    }
    println!();
    Ok(())
}

pub async fn diff(args: DiffArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.diff(&args.a, &args.b).await?;
    print_diff(&report, format)
}

fn print_diff(report: &RunDiffReport, format: OutputFormat) -> Result<()> {
    if print_structured(report, format)? {
        return Ok(());
    }

    if report.diff_count == 0 {
        print_success(&format!("Runs {} and {} have identical details", report.run_a, report.run_b));
        return Ok(());
    }

    let show = |v: &Option<serde_json::Value>| match v {
        Some(v) => v.to_string(),
        None => "(absent)".dimmed().to_string(),
    };

    let mut table = new_table();
    table.set_header(vec!["Path", report.run_a.as_str(), report.run_b.as_str()]);
    for entry in &report.diffs {
        table.add_row(vec![entry.path.clone(), show(&entry.a), show(&entry.b)]);
    }
    println!("{table}");

    if report.diffs.len() < report.diff_count {
        print_warning(&format!(
            "Showing {} of {} differences",
            report.diffs.len(),
            report.diff_count
        ));
    } else {
        println!("{} difference(s)", report.diff_count);
    }
    Ok(())
}

pub async fn clear(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.clear().await?;
    if print_structured(&report, format)? {
        return Ok(());
    }

    print_success(&format!(
        "Cleared {} run(s), deleted {} artifact director{}",
        report.runs_removed,
        report.dirs_deleted,
        if report.dirs_deleted == 1 { "y" } else { "ies" }
    ));
    if report.errors > 0 {
        print_warning(&format!("{} artifact director(ies) could not be deleted", report.errors));
    }
    Ok(())
}
