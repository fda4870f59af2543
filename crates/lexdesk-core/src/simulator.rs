use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, info_span, Instrument};

use crate::{
    config::SimulationConfig,
    source::{ProgressSource, RandomSource},
    stages::{all_stages, Stage},
    store::{TickOutcome, UploadStore},
    types::{RawFile, UploadCounts, UploadEvent, UploadedFile},
};

#[derive(Default)]
struct Drivers {
    in_flight: HashSet<String>,
    aborts: HashMap<String, AbortHandle>,
}

/// Owns the tracked uploads and one driver task per record.
///
/// Each driver advances only its own record. Removing a record does not
/// interrupt its driver: the next tick finds the record gone and the task
/// exits. `shutdown` is the only forcible cancellation.
pub struct UploadSimulator {
    store: Mutex<UploadStore>,
    source: Arc<dyn ProgressSource>,
    event_tx: broadcast::Sender<UploadEvent>,
    drivers: Mutex<Drivers>,
}

impl UploadSimulator {
    pub fn new(source: Arc<dyn ProgressSource>, event_capacity: usize) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Arc::new(Self {
            store: Mutex::new(UploadStore::new()),
            source,
            event_tx,
            drivers: Mutex::new(Drivers::default()),
        })
    }

    pub fn from_config(config: &SimulationConfig) -> Arc<Self> {
        Self::new(
            Arc::new(RandomSource::new(config)),
            config.event_channel_capacity,
        )
    }

    // ── Locking ───────────────────────────────────────────────────────────

    // A tick never leaves the store half-written, so a poisoned lock is safe to reuse.
    fn lock_store(&self) -> MutexGuard<'_, UploadStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_drivers(&self) -> MutexGuard<'_, Drivers> {
        self.drivers.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Public operations ─────────────────────────────────────────────────

    /// Track each file and start its driver. Must run inside a Tokio runtime.
    ///
    /// Returns the records as created (`progress = 0`, `uploading`, stage 0).
    pub fn submit(self: &Arc<Self>, files: Vec<RawFile>) -> Vec<UploadedFile> {
        if files.is_empty() {
            return Vec::new();
        }

        let created: Vec<UploadedFile> = {
            let mut store = self.lock_store();
            files
                .into_iter()
                .map(|raw| {
                    let file = store.create(raw);
                    let _ = self.event_tx.send(UploadEvent::Submitted { file: file.clone() });
                    file
                })
                .collect()
        };

        for file in &created {
            info!(
                "upload {} submitted: {} ({} bytes, {:?})",
                file.id, file.name, file.size, file.content_type
            );
            self.spawn_driver(file.id.clone());
        }
        created
    }

    /// Stop tracking `id`. Unknown ids are ignored.
    pub fn remove(&self, id: &str) -> Option<UploadedFile> {
        let mut store = self.lock_store();
        let removed = store.remove(id)?;
        let _ = self.event_tx.send(UploadEvent::Removed { id: id.to_string() });
        drop(store);
        info!("upload {id} removed: {}", removed.name);
        Some(removed)
    }

    /// Tracked records in submission order.
    pub fn list(&self) -> Vec<UploadedFile> {
        self.lock_store().snapshot()
    }

    pub fn get(&self, id: &str) -> Option<UploadedFile> {
        self.lock_store().get(id).cloned()
    }

    pub fn counts(&self) -> UploadCounts {
        self.lock_store().counts()
    }

    pub fn stages(&self) -> &'static [Stage] {
        all_stages()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    /// Ids whose driver task has not exited yet, sorted.
    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_drivers().in_flight.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Abort every running driver. Records keep their last state.
    pub fn shutdown(&self) {
        let mut drivers = self.lock_drivers();
        let count = drivers.in_flight.len();
        for (_, handle) in drivers.aborts.drain() {
            handle.abort();
        }
        drivers.in_flight.clear();
        if count > 0 {
            info!("aborted {count} upload driver(s)");
        }
    }

    // ── Drivers ───────────────────────────────────────────────────────────

    fn spawn_driver(self: &Arc<Self>, id: String) {
        self.lock_drivers().in_flight.insert(id.clone());

        let simulator = Arc::clone(self);
        let driver_id = id.clone();
        let span = info_span!("driver", upload = %id);
        let handle = tokio::spawn(
            async move {
                Arc::clone(&simulator).drive(&driver_id).await;
                simulator.finish_driver(&driver_id);
            }
            .instrument(span),
        );

        // The driver may already have finished; only keep handles for live ones.
        let mut drivers = self.lock_drivers();
        if drivers.in_flight.contains(&id) {
            drivers.aborts.insert(id, handle.abort_handle());
        }
    }

    fn finish_driver(&self, id: &str) {
        let mut drivers = self.lock_drivers();
        drivers.in_flight.remove(id);
        drivers.aborts.remove(id);
    }

    async fn drive(self: Arc<Self>, id: &str) {
        let mut accumulated = 0.0_f64;
        loop {
            let increment = self.source.next_increment();
            if increment.is_finite() && increment > 0.0 {
                accumulated += increment;
            }

            let outcome = {
                let mut store = self.lock_store();
                let outcome = store.apply_tick(id, accumulated);
                match &outcome {
                    TickOutcome::Advanced(file) => {
                        let _ = self.event_tx.send(UploadEvent::Progress { file: file.clone() });
                    }
                    TickOutcome::Completed(file) => {
                        let _ = self.event_tx.send(UploadEvent::Completed { file: file.clone() });
                    }
                    TickOutcome::Missing | TickOutcome::Terminal => {}
                }
                outcome
            };

            match &outcome {
                TickOutcome::Advanced(file) => {
                    debug!(
                        "upload {id} at {:.1}% (stage {})",
                        file.progress, file.current_stage
                    );
                }
                TickOutcome::Completed(file) => {
                    info!("upload {id} completed: {}", file.name);
                }
                TickOutcome::Missing => {
                    debug!("upload {id} no longer tracked, driver exiting");
                }
                TickOutcome::Terminal => {}
            }

            if !outcome.keeps_running() {
                return;
            }
            tokio::time::sleep(self.source.next_delay()).await;
        }
    }
}
