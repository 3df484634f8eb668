use std::sync::Arc;

use tracing::info;

use beachspot::config::{Config, InfraFailureMode};
use beachspot::model::{DAY_MS, HOUR_MS};
use beachspot::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    beachspot::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Store::open(config.wal_path())?);

    let policy = &config.engine.policy;
    info!("beachspot started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  venues: {}", store.venue_count());
    info!("  utc_offset: {}", config.engine.utc_offset);
    info!(
        "  policy: max_active={}, penalty_window={}h, no_show_threshold={}, suspension={}d, on_infra_failure={}",
        policy.max_active_reservations,
        policy.penalty_window / HOUR_MS,
        policy.no_show_threshold,
        policy.suspension_duration / DAY_MS,
        match policy.on_infra_failure {
            InfraFailureMode::FailOpen => "allow",
            InfraFailureMode::FailClosed => "deny",
        }
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let sweeper = tokio::spawn(beachspot::sweeper::run_sweeper(
        store.clone(),
        config.sweep_interval,
        config.compact_threshold,
    ));

    // Run until SIGTERM or ctrl-c.
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received");
    sweeper.abort();
    if let Err(e) = store.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }

    info!("beachspot stopped");
    Ok(())
}
