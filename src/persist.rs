//! Persistence collaborators
//!
//! The engine mirrors scan lifecycle transitions and session results to these
//! narrow interfaces. Persistence is best-effort relative to in-memory truth:
//! store failures are logged by the caller, never propagated as scan
//! failures. Schema and storage internals live outside this crate.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::scan::ScanRecord;
use crate::Result;

/// Mirror of scan lifecycle transitions
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Persist the initial record when a scan is created
    async fn save_scan(&self, record: &ScanRecord) -> Result<()>;

    /// Persist a status/progress/terminal transition
    async fn update_scan(&self, record: &ScanRecord) -> Result<()>;
}

/// Accumulated per-session result set, keyed by module name
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn session_results(&self, session_id: &str) -> HashMap<String, Value>;

    /// Write a finished scan's payload into the owning session's result set
    async fn append_session_result(
        &self,
        session_id: &str,
        module_name: &str,
        payload: Value,
    ) -> Result<()>;
}

/// In-memory store used by tests and the CLI
#[derive(Default)]
pub struct MemoryStore {
    scans: RwLock<HashMap<Uuid, ScanRecord>>,
    sessions: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn scan(&self, id: Uuid) -> Option<ScanRecord> {
        self.scans.read().await.get(&id).cloned()
    }

    pub async fn scan_count(&self) -> usize {
        self.scans.read().await.len()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn save_scan(&self, record: &ScanRecord) -> Result<()> {
        self.scans.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_scan(&self, record: &ScanRecord) -> Result<()> {
        self.scans.write().await.insert(record.id, record.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn session_results(&self, session_id: &str) -> HashMap<String, Value> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn append_session_result(
        &self,
        session_id: &str,
        module_name: &str,
        payload: Value,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(module_name.to_string(), payload);
        Ok(())
    }
}
