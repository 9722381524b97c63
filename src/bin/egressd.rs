use anyhow::{Context, Result};
use clap::Parser;
use egressd::backends::ProxyAdapterFactory;
use egressd::config::{DaemonConfig, DEFAULT_CONFIG_PATH};
use egressd::domain::events;
use egressd::domain::ports::{Firewall, NullFirewall};
use egressd::domain::services::{HealthMonitor, Supervisor};
use egressd::infrastructure::{IptablesFirewall, TcpLivenessProbe, UnixProcessRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "egressd", version, about = "Supervisor for proxy egress backends")]
struct Args {
    /// Path to the daemon config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stop all backend processes on shutdown instead of leaving them
    /// serving traffic
    #[arg(long)]
    stop_all: bool,

    /// Log filter, e.g. "info" or "egressd=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "egressd starting");

    let config = DaemonConfig::load(&args.config)?;
    std::fs::create_dir_all(&config.run_dir)
        .with_context(|| format!("creating run dir {}", config.run_dir.display()))?;

    let runner: Arc<dyn egressd::domain::ports::ProcessRunner> =
        Arc::new(UnixProcessRunner::new());
    let factory = Arc::new(ProxyAdapterFactory::new(
        Arc::clone(&runner),
        config.run_dir.clone(),
        config.binaries.clone(),
        config.stop_timeout(),
    ));
    let firewall: Arc<dyn Firewall> = if config.manage_firewall {
        Arc::new(IptablesFirewall::new())
    } else {
        Arc::new(NullFirewall)
    };
    let probe = Arc::new(TcpLivenessProbe::new(runner));
    let health = HealthMonitor::new(probe, Arc::clone(&firewall));

    let supervisor = Arc::new(Supervisor::new(
        factory,
        firewall,
        health,
        config.monitor_policy(),
        config.apply_concurrency,
    ));

    events::startup(config.egresses.len());
    let report = supervisor.apply_desired_state(config.egresses).await;
    if !report.is_ok() {
        warn!(
            failed = report.failed(),
            succeeded = report.succeeded(),
            "Initial apply finished with failures; they will be retried on reload"
        );
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
                break;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, reloading config");
                match DaemonConfig::load(&args.config) {
                    Ok(reloaded) => {
                        let report = supervisor.apply_desired_state(reloaded.egresses).await;
                        info!(
                            succeeded = report.succeeded(),
                            failed = report.failed(),
                            "Reload apply finished"
                        );
                    }
                    Err(e) => error!(error = %e, "Reload failed, keeping current state"),
                }
            }
        }
    }

    // Backends keep serving across a supervisor restart unless told
    // otherwise; pidfiles let the next instance re-adopt them.
    supervisor.shutdown(args.stop_all).await;
    Ok(())
}
