//! LoginLab CLI - Main Entry Point

use clap::{Parser, Subcommand};
use loginlab_cli::client::ApiClient;
use loginlab_cli::commands::{run, runs, scenarios};
use loginlab_cli::output::{self, print_success};

/// LoginLab CLI - run browser test suites against login scenarios
#[derive(Parser)]
#[command(name = "loginlab")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Control plane address
    #[arg(
        long,
        env = "LOGINLAB_API_URL",
        default_value = "http://127.0.0.1:41010",
        global = true
    )]
    api_url: String,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available scenarios
    Scenarios,

    /// Submit a run
    Run(run::RunArgs),

    /// List recent runs
    List(runs::ListArgs),

    /// Show a run
    Show(runs::ShowArgs),

    /// Compare the details of two runs
    Diff(runs::DiffArgs),

    /// Delete every run and its artifacts
    Clear,

    /// Check control plane status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let client = ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Scenarios => scenarios::execute(&client, cli.format).await?,
        Commands::Run(args) => run::execute(args, &client, cli.format).await?,
        Commands::List(args) => runs::list(args, &client, cli.format).await?,
        Commands::Show(args) => runs::show(args, &client, cli.format).await?,
        Commands::Diff(args) => runs::diff(args, &client, cli.format).await?,
        Commands::Clear => runs::clear(&client, cli.format).await?,
        Commands::Status => {
            if client.health_check().await {
                print_success(&format!("API is running at {}", cli.api_url));
            } else {
                println!("❌ API is not responding at {}", cli.api_url);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
