use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod detection;
mod engine;
mod frames;

use config::Config;
use dbus_interface::RollcallService;
use frames::SpoolDirSource;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let config = Config::from_env();

    // Model loading and gallery bootstrap are fail-fast: without the
    // analyzer nothing can run.
    let (engine, report) =
        engine::spawn_engine(&config).context("failed to start the analysis engine")?;
    tracing::info!(
        loaded = report.loaded,
        skipped = ?report.skipped_labels,
        failed_images = report.failed_images,
        "bundled references processed"
    );

    let latest = Arc::new(Mutex::new(Vec::new()));
    let overlay = Arc::new(AtomicBool::new(config.overlay_default));

    let service = RollcallService::new(engine.clone(), Arc::clone(&latest), Arc::clone(&overlay));
    let _connection = zbus::connection::Builder::session()?
        .name("org.rollcall.Rollcall1")?
        .serve_at("/org/rollcall/Rollcall1", service)?
        .build()
        .await
        .context("failed to claim the session bus name")?;

    let loop_task = tokio::spawn(detection::run_detection_loop(
        engine,
        Box::new(SpoolDirSource::new(&config.frame_dir)),
        Duration::from_millis(config.tick_interval_ms),
        latest,
    ));

    tracing::info!("rollcalld ready");
    tokio::signal::ctrl_c().await?;

    tracing::info!("rollcalld shutting down");
    loop_task.abort();
    // Dropping the engine handle closes its channel; the engine thread
    // drains and exits.
    Ok(())
}
