//! Scan lifecycle manager
//!
//! Creates one execution record per (session, module, target) run, launches
//! the module as an independent task, tracks status and progress, supports
//! cooperative cancellation, and mirrors every transition to the persistence
//! collaborator. Fire-and-track: `start_scan` returns immediately, and state
//! stays observable through `get_scan` even if nobody watches the stream.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::event::{EventSink, EventStream, EventSubscriber};
use crate::module::{ModuleInput, ModuleRegistry, ProbeModule};
use crate::persist::{ScanStore, SessionStore};
use crate::scan::{ScanRecord, ScanStatus};
use crate::{ReconError, Result};

struct ScanEntry {
    record: RwLock<ScanRecord>,
    token: CancellationToken,
    stream: Arc<EventStream>,
    module: Arc<dyn ProbeModule>,
}

impl ScanEntry {
    fn snapshot(&self) -> ScanRecord {
        self.record
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn mutate<F: FnOnce(&mut ScanRecord)>(&self, f: F) -> ScanRecord {
        match self.record.write() {
            Ok(mut record) => {
                f(&mut record);
                record.clone()
            }
            Err(poisoned) => {
                let mut record = poisoned.into_inner();
                f(&mut record);
                record.clone()
            }
        }
    }
}

/// Tracks every scan in the process; contention is scoped per scan, never
/// across unrelated scans.
pub struct ScanManager {
    config: CoreConfig,
    registry: Arc<ModuleRegistry>,
    store: Arc<dyn ScanStore>,
    sessions: Arc<dyn SessionStore>,
    scans: RwLock<HashMap<Uuid, Arc<ScanEntry>>>,
}

impl ScanManager {
    pub fn new(
        config: CoreConfig,
        registry: Arc<ModuleRegistry>,
        store: Arc<dyn ScanStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            store,
            sessions,
            scans: RwLock::new(HashMap::new()),
        })
    }

    /// Start a scan and return its initial record without waiting for it.
    ///
    /// Fails synchronously — creating no execution — when the module is not
    /// registered or the input does not pass the module's validation.
    pub async fn start_scan(
        self: &Arc<Self>,
        session_id: &str,
        module_name: &str,
        target: &str,
        options: HashMap<String, Value>,
    ) -> Result<ScanRecord> {
        let module = self
            .registry
            .get(module_name)
            .ok_or_else(|| ReconError::ModuleNotFound(module_name.to_string()))?;

        let input = ModuleInput {
            target: target.to_string(),
            options: options.clone(),
            session_id: session_id.to_string(),
            timeout: None,
        };
        module.validate(&input)?;

        let record = ScanRecord::new(session_id, module_name, target, options);
        let entry = Arc::new(ScanEntry {
            record: RwLock::new(record.clone()),
            token: CancellationToken::new(),
            stream: Arc::new(EventStream::new(self.config.event_buffer)),
            module,
        });

        if let Ok(mut scans) = self.scans.write() {
            scans.insert(record.id, entry.clone());
        }
        self.persist_new(&record).await;

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_scan(entry, input).await;
        });

        log::info!(
            "started scan {} ({} on {})",
            record.id,
            module_name,
            target
        );
        Ok(record)
    }

    /// Request cancellation of a running scan. Not an error when the scan has
    /// already finished; cancellation is requested, never awaited.
    pub async fn cancel_scan(&self, id: Uuid) -> Result<()> {
        let entry = self
            .entry(id)
            .ok_or_else(|| ReconError::InvalidInput(format!("scan {} not found", id)))?;

        if entry.snapshot().status != ScanStatus::Running {
            return Ok(());
        }

        entry.token.cancel();
        let record = entry.mutate(|r| {
            r.status = ScanStatus::Cancelled;
            r.completed_at = Some(chrono::Utc::now());
        });
        self.persist_update(&record).await;
        entry.module.stop();

        log::info!("cancelled scan {}", id);
        Ok(())
    }

    /// Non-blocking snapshot of one scan
    pub fn get_scan(&self, id: Uuid) -> Option<ScanRecord> {
        self.entry(id).map(|e| e.snapshot())
    }

    /// Non-blocking snapshots of every scan in a session
    pub fn get_session_scans(&self, session_id: &str) -> Vec<ScanRecord> {
        self.scans
            .read()
            .map(|scans| {
                scans
                    .values()
                    .map(|e| e.snapshot())
                    .filter(|r| r.session_id == session_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subscribe to a scan's event stream
    pub fn subscribe(&self, id: Uuid) -> Option<EventSubscriber> {
        self.entry(id).map(|e| e.stream.subscribe())
    }

    fn entry(&self, id: Uuid) -> Option<Arc<ScanEntry>> {
        self.scans.read().ok()?.get(&id).cloned()
    }

    async fn run_scan(self: Arc<Self>, entry: Arc<ScanEntry>, input: ModuleInput) {
        let record = entry.mutate(|r| {
            r.status = ScanStatus::Running;
            r.started_at = chrono::Utc::now();
        });
        self.persist_update(&record).await;

        let progress_entry = entry.clone();
        let sink = EventSink::new(&input.session_id, &record.module_name, entry.stream.clone())
            .with_progress_hook(Arc::new(move |progress| {
                if let Ok(mut r) = progress_entry.record.write() {
                    if r.status == ScanStatus::Running {
                        r.advance_progress(progress);
                    }
                }
            }));

        let outcome = entry
            .module
            .execute(entry.token.clone(), input, sink.clone())
            .await;

        let cancelled = entry.snapshot().status == ScanStatus::Cancelled;
        let record = match outcome {
            Ok(results) => entry.mutate(|r| {
                // A cancelled scan keeps its terminal status but still gets
                // whatever partial findings the module gathered.
                r.results = results;
                r.completed_at = Some(chrono::Utc::now());
                if !cancelled {
                    r.status = ScanStatus::Completed;
                    r.progress = 1.0;
                }
            }),
            Err(e) => {
                let message = e.to_string();
                sink.error(&message);
                entry.mutate(|r| {
                    r.completed_at = Some(chrono::Utc::now());
                    if !cancelled {
                        r.status = ScanStatus::Failed;
                        r.error = Some(message.clone());
                    }
                })
            }
        };

        // The module emits the terminal event on normal completion; make sure
        // the guaranteed slot is filled on every other path as well.
        if entry.stream.terminal_event().is_none() {
            let mut metadata = HashMap::new();
            metadata.insert(
                "status".to_string(),
                Value::String(record.status.to_string()),
            );
            sink.complete(record.results.clone(), metadata);
        }

        self.persist_update(&record).await;

        if record.status != ScanStatus::Failed && !record.results.is_null() {
            if let Err(e) = self
                .sessions
                .append_session_result(&record.session_id, &record.module_name, record.results.clone())
                .await
            {
                log::error!("failed to append session result for scan {}: {}", record.id, e);
            }
        }

        match record.status {
            ScanStatus::Completed => log::info!("scan {} completed", record.id),
            ScanStatus::Cancelled => log::info!("scan {} ended after cancellation", record.id),
            ScanStatus::Failed => log::warn!(
                "scan {} failed: {}",
                record.id,
                record.error.as_deref().unwrap_or("unknown error")
            ),
            _ => {}
        }
    }

    async fn persist_new(&self, record: &ScanRecord) {
        if let Err(e) = self.store.save_scan(record).await {
            log::error!("failed to persist scan {}: {}", record.id, e);
        }
    }

    async fn persist_update(&self, record: &ScanRecord) {
        if let Err(e) = self.store.update_scan(record).await {
            log::error!("failed to persist scan {} update: {}", record.id, e);
        }
    }
}
