//! Torpool - Entry Point
//!
//! Starts the tor cluster and runs the rotation scheduler until a stop is
//! requested, or creates the stop sentinel for an already-running cluster.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use torpool::cluster::{endpoints, InstanceLayout, TorLauncher};
use torpool::config::Config;
use torpool::control;
use torpool::error::Result;
use torpool::scheduler::RotationScheduler;
use torpool::sentinel::StopSentinel;
use torpool::shutdown::ShutdownCoordinator;

/// Run multiple rotating Tor proxies
#[derive(Parser, Debug)]
#[command(name = "torpool", version, about)]
struct Cli {
    /// Stop a running cluster and exit
    #[arg(long)]
    stop: bool,

    /// Path to the tor executable
    #[arg(long, value_name = "PATH")]
    tor: Option<PathBuf>,

    /// Tor instance count
    #[arg(long, value_name = "INT")]
    count: Option<u16>,

    /// Circuit switch delay in seconds
    #[arg(long, value_name = "TIME")]
    switch_delay: Option<u64>,

    /// First tor proxy port
    #[arg(long, value_name = "PORT")]
    port_proxy: Option<u16>,

    /// First tor control port
    #[arg(long, value_name = "PORT")]
    port_control: Option<u16>,

    /// Write the SOCKS endpoint list to this file
    #[arg(long, value_name = "FILE")]
    proxies: Option<PathBuf>,

    /// Exit grace period in seconds
    #[arg(long, value_name = "TIME")]
    exit_timeout: Option<u64>,
}

fn apply_cli(config: &mut Config, cli: &Cli) {
    if let Some(tor) = &cli.tor {
        config.tor_executable = tor.clone();
    }
    if let Some(count) = cli.count {
        config.instance_count = count;
    }
    if let Some(delay) = cli.switch_delay {
        config.switch_delay = delay;
    }
    if let Some(port) = cli.port_proxy {
        config.base_proxy_port = port;
    }
    if let Some(port) = cli.port_control {
        config.base_control_port = port;
    }
    if let Some(list) = &cli.proxies {
        config.proxy_list = Some(list.clone());
    }
    if let Some(timeout) = cli.exit_timeout {
        config.exit_timeout = timeout;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "torpool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Defaults, then file, then flags
    let mut config = Config::load(Path::new("."))?;
    apply_cli(&mut config, &cli);
    config.validate()?;

    let sentinel = StopSentinel::new(&config.base_dir);

    if cli.stop {
        // Fire-and-forget signal to the orchestrator sharing this
        // directory; it tears the cluster down itself.
        sentinel.request()?;
        info!("Stop requested");
        return Ok(());
    }

    let layout = InstanceLayout::new(&config.base_dir);
    let coordinator = ShutdownCoordinator::new(config.exit_timeout);

    if let Err(e) = run_cluster(&config, &layout, &sentinel, &coordinator).await {
        error!("{}", e);
    }

    // Unconditional teardown: a failed run must not leave instance state
    // or a stale sentinel behind.
    if let Err(e) = coordinator.reclaim(&layout, config.instance_count, &sentinel) {
        error!("Teardown failed: {}", e);
    }

    info!("Done.");
    Ok(())
}

/// Bring the cluster up, rotate until stopped, close the sessions
async fn run_cluster(
    config: &Config,
    layout: &InstanceLayout,
    sentinel: &StopSentinel,
    coordinator: &ShutdownCoordinator,
) -> Result<()> {
    info!("Tor command: {}", config.tor_executable.display());

    let launcher = TorLauncher::new(&config.tor_executable);
    let processes = launcher.launch_all(config, layout).await?;
    let mut sessions = control::attach_all(config).await?;

    if let Some(path) = &config.proxy_list {
        endpoints::write_endpoint_list(path, config.instance_count, config.base_proxy_port)
            .await?;
    }

    let scheduler = RotationScheduler::new(config.switch_delay);
    scheduler.run(&mut sessions, sentinel).await?;

    coordinator.close_sessions(&mut sessions).await;

    // Dropping the handles after the grace period reaps anything that
    // did not exit on its own.
    drop(processes);
    Ok(())
}
