//! Run submission command

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::client::{poll_until_terminal, ApiClient};
use crate::commands::runs::print_run;
use crate::output::{print_info, print_success, print_warning, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario ID
    #[arg(default_value = loginlab_common::DEFAULT_SCENARIO_ID)]
    pub scenario: String,

    /// Test title to run (repeatable); all tests when omitted
    #[arg(short, long = "test")]
    pub tests: Vec<String>,

    /// Wait for the run to finish
    #[arg(short, long)]
    pub wait: bool,

    /// Delay between status polls
    #[arg(long, default_value = "800")]
    pub interval_ms: u64,

    /// Polls before giving up waiting
    #[arg(long, default_value = "25")]
    pub max_polls: u32,
}

pub async fn execute(args: RunArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let run = client.submit(&args.scenario, args.tests).await?;
    let quiet = format != OutputFormat::Table;

    if !quiet {
        print_success(&format!("Run {} queued for {}", run.id, run.scenario_id));
    }
    if !args.wait {
        return print_run(&run, client.base_url(), format);
    }

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    };
    spinner.set_message(format!("{} {}", run.id, run.status));

    let id = run.id.clone();
    let outcome = poll_until_terminal(
        || client.get_run(&id),
        Duration::from_millis(args.interval_ms),
        args.max_polls,
        |run| spinner.set_message(format!("{} {}", run.id, run.status)),
    )
    .await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    if !quiet {
        if outcome.terminal {
            print_info(&format!("Finished after {} poll(s)", outcome.polls));
        } else {
            print_warning(&format!(
                "Run still {} after {} poll(s); showing latest state",
                outcome.run.status, outcome.polls
            ));
        }
    }
    print_run(&outcome.run, client.base_url(), format)
}
