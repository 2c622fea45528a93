//! LoginLab runner daemon

use clap::Parser;
use loginlab_common::ArtifactStore;
use loginlab_runner::{
    server, Executor, HttpStatusReporter, PlaywrightDriver, RunnerConfig, RunnerState, SuiteMap,
    Worker,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "loginlab-runner")]
#[command(about = "LoginLab runner - executes browser test suites")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "loginlab-runner.toml")]
    config: PathBuf,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Control plane base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Artifact root directory
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Directory of YAML suites
    #[arg(long)]
    suites_dir: Option<PathBuf>,

    /// Jobs executed at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("LoginLab runner v{}", loginlab_common::VERSION);

    let mut config = RunnerConfig::load(&cli.config)?;
    config.apply_env();
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(dir) = cli.artifacts_dir {
        config.artifacts_dir = dir;
    }
    if let Some(dir) = cli.suites_dir {
        config.suites_dir = dir;
    }
    if let Some(n) = cli.concurrency {
        config.concurrency = n;
    }
    if cli.headed {
        config.browser.headless = false;
    }

    let suites = SuiteMap::discover(&config.suites_dir)?;
    for id in suites.scenario_ids() {
        info!("Suites available for {}", id);
    }

    let executor = Executor::new(
        Arc::new(suites),
        Arc::new(PlaywrightDriver::new(config.browser.clone())),
        ArtifactStore::new(&config.artifacts_dir),
    );
    let reporter = HttpStatusReporter::new(config.api_base_url.clone(), config.callback_timeout())?;
    let (worker, worker_handle) = Worker::start(
        executor,
        Arc::new(reporter),
        config.concurrency,
        config.default_deadline(),
    );

    let addr: SocketAddr = config.listen.parse()?;
    let server_handle = tokio::spawn(server::serve(addr, RunnerState { worker }));

    info!("Reporting to control plane at {}", config.api_base_url);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Runner server error: {}", e),
                Err(e) => error!("Runner server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    worker_handle.abort();

    info!("Runner shutdown complete");
    Ok(())
}
