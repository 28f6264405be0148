//! Scan execution records and lifecycle management

pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub use manager::ScanManager;

/// Lifecycle state of one scan execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One run of a module against a target within a session. Owned exclusively
/// by the scan manager; modules never write it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub session_id: String,
    pub module_name: String,
    pub target: String,
    pub status: ScanStatus,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub options: HashMap<String, Value>,
}

impl ScanRecord {
    pub fn new(
        session_id: &str,
        module_name: &str,
        target: &str,
        options: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            module_name: module_name.to_string(),
            target: target.to_string(),
            status: ScanStatus::Pending,
            progress: 0.0,
            started_at: Utc::now(),
            completed_at: None,
            results: Value::Null,
            error: None,
            options,
        }
    }

    /// Progress only ever moves forward
    pub fn advance_progress(&mut self, progress: f64) {
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let mut record = ScanRecord::new("s1", "port_scan", "10.0.0.5", HashMap::new());
        record.advance_progress(0.4);
        record.advance_progress(0.2);
        assert_eq!(record.progress, 0.4);
        record.advance_progress(1.5);
        assert_eq!(record.progress, 1.0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ScanStatus::Pending.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
    }
}
