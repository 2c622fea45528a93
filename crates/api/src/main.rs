//! LoginLab control plane daemon

use clap::Parser;
use loginlab_api::{
    server, ApiConfig, ApiState, Dispatcher, HttpRunnerTransport, Reaper, RunRegistry,
};
use loginlab_common::{ArtifactStore, ScenarioCatalog};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "loginlab-api")]
#[command(about = "LoginLab control plane - run registry and HTTP API")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "loginlab-api.toml")]
    config: PathBuf,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Runner base URL
    #[arg(long)]
    runner_url: Option<String>,

    /// Artifact root directory
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Scenario catalog (TOML)
    #[arg(long)]
    catalog: Option<PathBuf>,

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

    info!("LoginLab API v{}", loginlab_common::VERSION);

    let mut config = ApiConfig::load(&cli.config)?;
    config.apply_env();
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(url) = cli.runner_url {
        config.runner_url = url;
    }
    if let Some(dir) = cli.artifacts_dir {
        config.artifacts_dir = dir;
    }
    if let Some(path) = cli.catalog {
        config.catalog_path = Some(path);
    }

    let catalog = match &config.catalog_path {
        Some(path) => ScenarioCatalog::from_toml_file(path)?,
        None => ScenarioCatalog::builtin(),
    };
    info!("Loaded {} scenarios", catalog.all().len());

    tokio::fs::create_dir_all(config.artifacts_dir.join("runs")).await?;

    let registry = Arc::new(RunRegistry::in_memory(
        Arc::new(catalog),
        ArtifactStore::new(&config.artifacts_dir),
    ));

    let transport = HttpRunnerTransport::new(
        config.runner_url.clone(),
        Duration::from_secs(config.dispatch_timeout_secs),
    )?;
    let (dispatcher, dispatcher_handle) = Dispatcher::start(registry.clone(), Arc::new(transport));

    let shutdown = CancellationToken::new();
    let reaper = Reaper::new(
        registry.clone(),
        Duration::from_secs(config.reaper_interval_secs.max(1)),
        config.reaper_max_age_secs(),
    );
    let reaper_handle = tokio::spawn(reaper.run(shutdown.clone()));

    let addr: SocketAddr = config.listen.parse()?;
    let state = ApiState {
        registry,
        dispatcher,
        job_deadline_secs: config.job_deadline_secs,
    };
    let server_handle = tokio::spawn(server::serve(addr, state));

    info!("Dispatching to runner at {}", config.runner_url);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("API server error: {}", e),
                Err(e) => error!("API server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    shutdown.cancel();
    let _ = reaper_handle.await;
    dispatcher_handle.abort();

    info!("API shutdown complete");
    Ok(())
}
