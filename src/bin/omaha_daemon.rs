//! Background update-check daemon.
//!
//! Loads the configuration from `OMAHA_CONFIG` (or the default path), runs
//! one activation immediately and keeps running until Ctrl-C. Diagnostics
//! go to stderr; set `RUST_LOG` to change verbosity.

use omaha::{
    ActivityTracker, HostProfile, OmahaConfig, SchedulerService, SystemClock, TokioWakeup, Trigger,
    build_scheduler,
};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::var_os("OMAHA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(OmahaConfig::default_config_path);
    let config = if path.exists() {
        OmahaConfig::from_file(&path)?
    } else {
        tracing::warn!("no config at {}, using defaults", path.display());
        OmahaConfig::default()
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;

    let host = HostProfile::detect();
    tracing::info!(os = %host.os, version = %host.os_version, "omaha-daemon starting");

    let (triggers, rx) = SchedulerService::channel();
    let tracker = ActivityTracker::new(SystemClock);
    let wakeup = TokioWakeup::new(tokio::runtime::Handle::current(), triggers.clone());
    let window = Duration::from_secs(config.schedule.activity_window_secs);
    let probe = tracker.probe(window);
    let scheduler = build_scheduler(&config, host, Box::new(wakeup), probe);

    if scheduler.is_probably_fresh_install() {
        tracing::info!("no previous check-in state, first run");
    }

    // A running daemon counts as a host in use.
    let service = SchedulerService::new(scheduler, tracker, rx)
        .with_heartbeat((window / 2).max(Duration::from_secs(1)))
        .spawn();
    triggers.send(Trigger::HostActive).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    triggers.send(Trigger::Shutdown).await?;

    match service.await? {
        Some(scheduler) => {
            let status = scheduler.update_status();
            if status.newer_version_available {
                tracing::info!(
                    "version {} available at {}",
                    status.latest_version,
                    status.distribution_url
                );
            }
        }
        None => tracing::error!("update check service stopped abnormally"),
    }
    Ok(())
}
