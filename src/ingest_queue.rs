//! Ingestion worker pool.
//!
//! A dispatcher drains the watcher channel and shards events by path hash
//! onto a fixed set of worker queues: one path is always handled by the
//! same worker, in observed order, while different paths run in parallel.
//! Workers are blocking threads, each with its own store connection.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::StrategicDb;
use crate::processor::{process_event, ChangeEvent, ProcessingResult};
use crate::state::AppState;

/// Capacity of each worker's queue.
const WORKER_QUEUE_DEPTH: usize = 256;

/// Attempts per event when the store reports a retryable error.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between retries; grows linearly per attempt.
const RETRY_BACKOFF_MS: u64 = 50;

/// Running totals across all workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestStats {
    pub processed: u64,
    pub promoted: u64,
    pub duplicates: u64,
    pub degraded: u64,
    pub failed: u64,
}

impl IngestStats {
    fn record(&mut self, result: Option<&ProcessingResult>) {
        match result {
            Some(ProcessingResult::Duplicate) => self.duplicates += 1,
            Some(ProcessingResult::Recorded { .. }) => self.processed += 1,
            Some(ProcessingResult::Promoted { .. }) => {
                self.processed += 1;
                self.promoted += 1;
            }
            Some(ProcessingResult::Degraded { .. }) => {
                self.processed += 1;
                self.degraded += 1;
            }
            None => self.failed += 1,
        }
    }
}

pub type SharedStats = Arc<Mutex<IngestStats>>;

/// Stable worker index for a path.
pub fn shard_for(path: &Path, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// Spawn `config.worker_count` workers plus the dispatcher.
///
/// The store must already be migrated (open it once before calling this)
/// so workers never race on schema setup. The returned handle completes
/// once `events` is closed and every worker has drained its queue.
pub fn start_ingest_workers(
    state: Arc<AppState>,
    mut events: mpsc::Receiver<ChangeEvent>,
    stats: SharedStats,
) -> JoinHandle<()> {
    let worker_count = state.config.worker_count.max(1);
    let mut senders = Vec::with_capacity(worker_count);
    let mut workers = Vec::with_capacity(worker_count);

    for index in 0..worker_count {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(WORKER_QUEUE_DEPTH);
        senders.push(tx);
        let state = state.clone();
        let stats = stats.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            run_worker(index, &state, rx, &stats)
        }));
    }

    log::info!("IngestQueue: started {} workers", worker_count);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let shard = shard_for(&event.path, senders.len());
            if senders[shard].send(event).await.is_err() {
                log::error!("IngestQueue: worker {} exited, stopping dispatch", shard);
                break;
            }
        }
        drop(senders);
        for worker in workers {
            if let Err(e) = worker.await {
                log::error!("IngestQueue: worker panicked: {}", e);
            }
        }
        log::info!("IngestQueue: stopped");
    })
}

fn run_worker(
    index: usize,
    state: &AppState,
    mut rx: mpsc::Receiver<ChangeEvent>,
    stats: &SharedStats,
) {
    let db = match state.open_db() {
        Ok(db) => db,
        Err(e) => {
            log::error!("IngestQueue: worker {} could not open the store: {}", index, e);
            return;
        }
    };
    while let Some(event) = rx.blocking_recv() {
        let result = process_with_retry(state, &db, &event);
        stats.lock().record(result.as_ref());
    }
}

/// Process one event, retrying store conflicts and lock contention with a
/// fresh read each time. `None` when the event could not be ingested.
pub fn process_with_retry(
    state: &AppState,
    db: &StrategicDb,
    event: &ChangeEvent,
) -> Option<ProcessingResult> {
    let mut attempt = 1;
    loop {
        match process_event(state, db, event) {
            Ok(result) => return Some(result),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                log::debug!(
                    "IngestQueue: retrying {} (attempt {}): {}",
                    event.path.display(),
                    attempt,
                    e
                );
                std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64));
                attempt += 1;
            }
            Err(e) => {
                log::warn!("IngestQueue: giving up on {}: {}", event.path.display(), e);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ChangeType;
    use crate::types::Config;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_shard_is_stable_and_in_range() {
        let path = PathBuf::from("/ws/meeting-prep/notes.md");
        let first = shard_for(&path, 4);
        assert!(first < 4);
        assert_eq!(first, shard_for(&path, 4));
        assert_eq!(shard_for(&path, 0), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_workers_drain_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        fs::create_dir_all(ws.join("tasks")).unwrap();
        let mut config = Config::with_workspace(ws.to_string_lossy());
        config.database_path = Some(dir.path().join("s.db").to_string_lossy().into_owned());
        config.worker_count = 2;
        let state = Arc::new(AppState::from_config(config).unwrap());
        let db = state.open_db().unwrap();

        let a = ws.join("tasks/a.md");
        let b = ws.join("tasks/b.md");
        fs::write(&a, "- [ ] Renew vendor contract\n").unwrap();
        fs::write(&b, "- [ ] Draft hiring plan\n").unwrap();

        let stats: SharedStats = Arc::default();
        let (tx, rx) = mpsc::channel(16);
        let handle = start_ingest_workers(state.clone(), rx, stats.clone());
        for path in [&a, &b, &a] {
            tx.send(ChangeEvent::new(path.clone(), ChangeType::FileCreated))
                .await
                .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let totals = *stats.lock();
        assert_eq!(totals.promoted, 2);
        assert_eq!(totals.duplicates, 1);
        assert_eq!(totals.failed, 0);

        assert_eq!(db.get_tasks(None).unwrap().len(), 2);
    }
}
