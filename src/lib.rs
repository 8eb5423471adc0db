pub mod db;
pub mod entity;
pub mod error;
pub mod ingest_queue;
mod migrations;
pub mod prioritization;
pub mod processor;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod templates;
pub mod types;
pub mod util;
pub mod watcher;

use std::sync::Arc;

use state::AppState;
use tokio::sync::mpsc;

/// Channel buffer size for watcher -> dispatcher events
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Run every background service until Ctrl-C.
///
/// Startup order matters: the store is opened (and migrated) once before
/// any worker connects, templates are published, and a rescan catches up on
/// anything that changed while the service was down.
pub async fn run(state: Arc<AppState>) -> Result<(), String> {
    let startup_state = state.clone();
    tokio::task::spawn_blocking(move || -> Result<(), String> {
        let db = startup_state.open_db().map_err(|e| e.to_string())?;
        let synced = db
            .sync_templates(&startup_state.rules.templates())
            .map_err(|e| e.to_string())?;
        log::info!("Startup: {} templates registered", synced);

        processor::rescan_workspace(&startup_state, &db);
        Ok(())
    })
    .await
    .map_err(|e| format!("Startup task panicked: {}", e))??;

    let stats: ingest_queue::SharedStats = Arc::default();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let workers = ingest_queue::start_ingest_workers(state.clone(), event_rx, stats.clone());

    // Dropping the watcher stops the watch and closes the channel
    let watcher = watcher::start_watcher(state.clone(), event_tx)?;

    let scheduler = scheduler::Scheduler::new(state.clone(), stats.clone())?;
    let scheduler_task = tokio::spawn(async move {
        scheduler.run().await;
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;
    log::info!("Shutdown: stopping watcher and draining ingestion queue");

    scheduler_task.abort();
    drop(watcher);
    if let Err(e) = workers.await {
        log::error!("Shutdown: ingestion dispatcher panicked: {}", e);
    }

    let totals = *stats.lock();
    log::info!(
        "Shutdown: {} processed, {} promoted, {} duplicates, {} degraded, {} failed",
        totals.processed,
        totals.promoted,
        totals.duplicates,
        totals.degraded,
        totals.failed
    );
    Ok(())
}
