//! Scan lifecycle scenarios against the manager

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use reconx::event::{EventKind, EventSink};
use reconx::fanout::fan_out_silent;
use reconx::module::registry::builtin_registry;
use reconx::module::{
    BaseModule, ModuleInfo, ModuleInput, ModuleRegistry, ModuleState, ModuleStatus, ProbeModule,
};
use reconx::persist::{MemoryStore, SessionStore};
use reconx::scan::manager::ScanManager;
use reconx::scan::ScanStatus;
use reconx::{CoreConfig, Result};

/// Test probe that works through a fixed candidate set with slow checks
struct SlowProbe {
    base: BaseModule,
    candidates: usize,
    check_ms: u64,
}

impl SlowProbe {
    fn new(name: &str, candidates: usize, check_ms: u64) -> Self {
        let info = ModuleInfo {
            name: name.to_string(),
            category: "test".to_string(),
            description: "slow synthetic probe".to_string(),
            version: "0.0.1".to_string(),
            author: "tests".to_string(),
            tags: vec![],
            options: vec![],
            requirements: vec![],
        };
        Self {
            base: BaseModule::new(info),
            candidates,
            check_ms,
        }
    }
}

#[async_trait]
impl ProbeModule for SlowProbe {
    fn info(&self) -> ModuleInfo {
        self.base.info()
    }

    fn validate(&self, input: &ModuleInput) -> Result<()> {
        self.base.validate_input(input)
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        _input: ModuleInput,
        sink: EventSink,
    ) -> Result<Value> {
        let token = self.base.begin_run(&cancel);
        let check_ms = self.check_ms;

        let checked = fan_out_silent(
            (0..self.candidates).collect(),
            5,
            &token,
            |n| async move {
                tokio::time::sleep(Duration::from_millis(check_ms)).await;
                Some(n)
            },
        )
        .await;

        let payload = serde_json::json!({ "checked": checked.len() });
        if token.is_cancelled() {
            self.base.finish_run(ModuleState::Stopped, "stopped");
            return Ok(payload);
        }

        self.base.finish_run(ModuleState::Completed, "done");
        sink.complete(payload.clone(), HashMap::new());
        Ok(payload)
    }

    fn stop(&self) {
        self.base.request_stop();
    }

    fn status(&self) -> ModuleStatus {
        self.base.status()
    }
}

fn manager_with(
    registry: Arc<ModuleRegistry>,
) -> (Arc<ScanManager>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let manager = ScanManager::new(
        CoreConfig::default(),
        registry,
        store.clone(),
        store.clone(),
    );
    (manager, store)
}

/// Poll until the record satisfies `pred`. The terminal event can race the
/// manager's final record update, so record-level assertions poll instead of
/// keying off the event.
async fn wait_for_record<F>(
    manager: &Arc<ScanManager>,
    id: Uuid,
    pred: F,
) -> reconx::scan::ScanRecord
where
    F: Fn(&reconx::scan::ScanRecord) -> bool,
{
    for _ in 0..400 {
        if let Some(record) = manager.get_scan(id) {
            if pred(&record) {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("scan {} never reached the expected state", id);
}

#[tokio::test]
async fn test_unknown_module_fails_synchronously() {
    let (manager, store) = manager_with(builtin_registry(&CoreConfig::default()));

    let result = manager
        .start_scan("s1", "no_such_module", "example.com", HashMap::new())
        .await;
    assert!(result.is_err());
    assert!(manager.get_session_scans("s1").is_empty());
    assert_eq!(store.scan_count().await, 0);
}

#[tokio::test]
async fn test_validation_failure_creates_no_execution() {
    let (manager, store) = manager_with(builtin_registry(&CoreConfig::default()));

    let result = manager
        .start_scan("s1", "port_scan", "not a target!", HashMap::new())
        .await;
    let err = result.unwrap_err();
    assert!(err.is_validation());
    assert!(manager.get_session_scans("s1").is_empty());
    assert_eq!(store.scan_count().await, 0);
}

#[tokio::test]
async fn test_undeclared_option_fails_the_scan() {
    let (manager, _) = manager_with(builtin_registry(&CoreConfig::default()));

    // Option schemas are checked at execution start, so the scan record is
    // created, then transitions to failed.
    let mut options = HashMap::new();
    options.insert("bogus_option".to_string(), Value::Bool(true));
    let record = manager
        .start_scan("s1", "port_scan", "127.0.0.1", options)
        .await
        .unwrap();

    let mut sub = manager.subscribe(record.id).unwrap();
    let terminal = timeout(Duration::from_secs(5), sub.terminal())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(terminal.kind, EventKind::Error);

    let record = wait_for_record(&manager, record.id, |r| r.status.is_terminal()).await;
    assert_eq!(record.status, ScanStatus::Failed);
    assert!(record.error.unwrap().contains("bogus_option"));
}

#[tokio::test]
async fn test_port_scan_against_local_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (manager, store) = manager_with(builtin_registry(&CoreConfig::default()));

    let mut options = HashMap::new();
    options.insert("ports".to_string(), Value::String(port.to_string()));
    options.insert("banner_grab".to_string(), Value::Bool(false));
    let record = manager
        .start_scan("s1", "port_scan", "127.0.0.1", options)
        .await
        .unwrap();
    assert_eq!(record.status, ScanStatus::Pending);

    let mut sub = manager.subscribe(record.id).unwrap();
    let terminal = timeout(Duration::from_secs(10), sub.terminal())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(terminal.kind, EventKind::Complete);

    let record =
        wait_for_record(&manager, record.id, |r| r.status == ScanStatus::Completed).await;
    assert_eq!(record.progress, 1.0);
    assert!(record.completed_at.is_some());

    let open_ports = record.results["open_ports"].as_array().unwrap();
    assert!(open_ports.iter().any(|p| p["port"] == port));

    // Lifecycle mirrored to the store, result appended to the session.
    for _ in 0..200 {
        if store.session_results("s1").await.contains_key("port_scan") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let stored = store.scan(record.id).await.unwrap();
    assert_eq!(stored.status, ScanStatus::Completed);
    assert!(store.session_results("s1").await.contains_key("port_scan"));

    drop(listener);
}

#[tokio::test]
async fn test_cancellation_yields_partial_results() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(Arc::new(SlowProbe::new("slow", 1000, 50)));
    let (manager, store) = manager_with(registry);

    let record = manager
        .start_scan("s1", "slow", "anything", HashMap::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    manager.cancel_scan(record.id).await.unwrap();

    // Cancellation is requested, not awaited: the record flips immediately.
    let snapshot = manager.get_scan(record.id).unwrap();
    assert_eq!(snapshot.status, ScanStatus::Cancelled);

    // The module winds down and its partial results land on the record.
    let record = wait_for_record(&manager, record.id, |r| !r.results.is_null()).await;
    assert_eq!(record.status, ScanStatus::Cancelled);
    let checked = record.results["checked"].as_u64().unwrap();
    assert!(checked < 1000);

    let mut sub = manager.subscribe(record.id).unwrap();
    timeout(Duration::from_secs(5), sub.terminal())
        .await
        .unwrap()
        .unwrap();

    let stored = store.scan(record.id).await.unwrap();
    assert_eq!(stored.status, ScanStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_unknown_scan_is_an_error() {
    let (manager, _) = manager_with(builtin_registry(&CoreConfig::default()));
    assert!(manager.cancel_scan(Uuid::new_v4()).await.is_err());
}

#[tokio::test]
async fn test_cancel_after_completion_is_a_noop() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(Arc::new(SlowProbe::new("quick", 3, 1)));
    let (manager, _) = manager_with(registry);

    let record = manager
        .start_scan("s1", "quick", "anything", HashMap::new())
        .await
        .unwrap();

    wait_for_record(&manager, record.id, |r| r.status == ScanStatus::Completed).await;

    manager.cancel_scan(record.id).await.unwrap();
    let record = manager.get_scan(record.id).unwrap();
    assert_eq!(record.status, ScanStatus::Completed);
}

#[tokio::test]
async fn test_terminal_event_outlives_slow_subscriber() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(Arc::new(SlowProbe::new("quick", 10, 1)));
    let (manager, _) = manager_with(registry);

    let record = manager
        .start_scan("s1", "quick", "anything", HashMap::new())
        .await
        .unwrap();

    // Nobody subscribed while the scan ran; the terminal slot still holds.
    let mut sub = manager.subscribe(record.id).unwrap();
    let terminal = timeout(Duration::from_secs(5), sub.terminal())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(terminal.kind, EventKind::Complete);
    assert_eq!(terminal.payload["checked"], 10);
}

#[tokio::test]
async fn test_session_scans_are_isolated() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(Arc::new(SlowProbe::new("quick", 2, 1)));
    let (manager, _) = manager_with(registry);

    manager
        .start_scan("alpha", "quick", "t1", HashMap::new())
        .await
        .unwrap();
    manager
        .start_scan("alpha", "quick", "t2", HashMap::new())
        .await
        .unwrap();
    manager
        .start_scan("beta", "quick", "t3", HashMap::new())
        .await
        .unwrap();

    assert_eq!(manager.get_session_scans("alpha").len(), 2);
    assert_eq!(manager.get_session_scans("beta").len(), 1);
    assert!(manager.get_session_scans("gamma").is_empty());
}

#[tokio::test]
async fn test_registering_same_name_replaces_module() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.register(Arc::new(SlowProbe::new("dup", 1, 1)));
    registry.register(Arc::new(SlowProbe::new("dup", 99, 1)));

    assert_eq!(registry.count(), 1);
    let (manager, _) = manager_with(registry);

    let record = manager
        .start_scan("s1", "dup", "anything", HashMap::new())
        .await
        .unwrap();
    let mut sub = manager.subscribe(record.id).unwrap();
    let terminal = timeout(Duration::from_secs(5), sub.terminal())
        .await
        .unwrap()
        .unwrap();

    // The replacement (99 candidates) ran, not the original.
    assert_eq!(terminal.payload["checked"], 99);
}
