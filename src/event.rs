//! Event streaming out of running scans
//!
//! Advisory events (progress, data) ride a bounded broadcast channel: sending
//! never blocks, and slow or absent consumers miss messages instead of
//! stalling the producer. The terminal event (complete, error) is delivered
//! through a single-slot watch channel that is always readable, and the scan
//! record itself is the final source of truth for terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Kind of notice emitted by a running module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Data,
    Error,
    Complete,
}

impl EventKind {
    /// Terminal events are the authoritative end-of-scan signal
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error)
    }
}

/// A single notice from a running scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub module: String,
}

impl Event {
    pub fn new(kind: EventKind, payload: Value, session_id: &str, module: &str) -> Self {
        Self {
            kind,
            payload,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            module: module.to_string(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Per-scan event channel pair
pub struct EventStream {
    advisory: broadcast::Sender<Event>,
    terminal: watch::Sender<Option<Event>>,
}

impl EventStream {
    /// Create a stream with the given advisory buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (advisory, _) = broadcast::channel(capacity.max(1));
        let (terminal, _) = watch::channel(None);
        Self { advisory, terminal }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            advisory: self.advisory.subscribe(),
            terminal: self.terminal.subscribe(),
        }
    }

    /// Best-effort send; dropped when nobody is listening
    fn publish_advisory(&self, event: Event) {
        let _ = self.advisory.send(event);
    }

    /// Guaranteed single-slot delivery; later reads always observe it even
    /// when no receiver existed at publish time
    fn publish_terminal(&self, event: Event) {
        self.terminal.send_replace(Some(event));
    }

    /// The terminal event, if the scan has already finished
    pub fn terminal_event(&self) -> Option<Event> {
        self.terminal.borrow().clone()
    }
}

/// Consumer half of a scan's event stream
pub struct EventSubscriber {
    advisory: broadcast::Receiver<Event>,
    terminal: watch::Receiver<Option<Event>>,
}

impl EventSubscriber {
    /// Next advisory event. Lagged messages are skipped, not errors; returns
    /// `None` once the producing scan is gone.
    pub async fn next_advisory(&mut self) -> Option<Event> {
        loop {
            match self.advisory.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("event subscriber lagged, {} advisory events dropped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the terminal event
    pub async fn terminal(&mut self) -> Option<Event> {
        let result = self
            .terminal
            .wait_for(|slot| slot.is_some())
            .await
            .ok()
            .map(|slot| slot.clone());
        result.flatten()
    }

    /// Non-blocking read of the terminal slot
    pub fn try_terminal(&self) -> Option<Event> {
        self.terminal.borrow().clone()
    }
}

/// Producer face handed to an executing module
///
/// Progress reported here is the single coherent progress signal: the sink
/// forwards it to the owning scan record through the installed hook.
#[derive(Clone)]
pub struct EventSink {
    session_id: String,
    module: String,
    stream: Arc<EventStream>,
    progress_hook: Option<Arc<dyn Fn(f64) + Send + Sync>>,
}

impl EventSink {
    pub fn new(session_id: &str, module: &str, stream: Arc<EventStream>) -> Self {
        Self {
            session_id: session_id.to_string(),
            module: module.to_string(),
            stream,
            progress_hook: None,
        }
    }

    /// Stand-alone sink with its own stream, mostly for module-level tests
    pub fn detached(session_id: &str, module: &str, capacity: usize) -> Self {
        Self::new(session_id, module, Arc::new(EventStream::new(capacity)))
    }

    pub fn with_progress_hook(mut self, hook: Arc<dyn Fn(f64) + Send + Sync>) -> Self {
        self.progress_hook = Some(hook);
        self
    }

    pub fn stream(&self) -> &Arc<EventStream> {
        &self.stream
    }

    /// Advisory progress notice; also drives the scan record's progress
    pub fn progress(&self, fraction: f64, message: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        if let Some(hook) = &self.progress_hook {
            hook(fraction);
        }

        let payload = serde_json::json!({
            "progress": fraction,
            "message": message,
        });
        self.stream.publish_advisory(Event::new(
            EventKind::Progress,
            payload,
            &self.session_id,
            &self.module,
        ));
    }

    /// Advisory partial-data notice
    pub fn data(&self, payload: Value, metadata: HashMap<String, Value>) {
        self.stream.publish_advisory(
            Event::new(EventKind::Data, payload, &self.session_id, &self.module)
                .with_metadata(metadata),
        );
    }

    /// Terminal completion notice carrying the full structured result
    pub fn complete(&self, payload: Value, metadata: HashMap<String, Value>) {
        if let Some(hook) = &self.progress_hook {
            hook(1.0);
        }
        self.stream.publish_terminal(
            Event::new(EventKind::Complete, payload, &self.session_id, &self.module)
                .with_metadata(metadata),
        );
    }

    /// Terminal error notice
    pub fn error(&self, message: &str) {
        self.stream.publish_terminal(Event::new(
            EventKind::Error,
            Value::String(message.to_string()),
            &self.session_id,
            &self.module,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_consumer_never_blocks_producer() {
        let sink = EventSink::detached("s1", "test", 4);
        // No subscriber: every advisory send is dropped on the floor.
        for i in 0..10_000 {
            sink.progress(i as f64 / 10_000.0, "tick");
        }
        sink.complete(Value::Null, HashMap::new());

        // Terminal is still observable after the fact.
        let sub = sink.stream().subscribe();
        let terminal = sub.try_terminal().unwrap();
        assert_eq!(terminal.kind, EventKind::Complete);
    }

    #[tokio::test]
    async fn test_late_subscriber_awaits_terminal_published_to_nobody() {
        let sink = EventSink::detached("s1", "test", 4);
        // Terminal published while zero receivers exist.
        sink.complete(serde_json::json!({ "total": 7 }), HashMap::new());
        assert!(sink.stream().terminal_event().is_some());

        let mut sub = sink.stream().subscribe();
        let terminal = tokio::time::timeout(std::time::Duration::from_secs(1), sub.terminal())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(terminal.kind, EventKind::Complete);
        assert_eq!(terminal.payload["total"], 7);
    }

    #[tokio::test]
    async fn test_slow_consumer_drops_advisory_but_keeps_terminal() {
        let sink = EventSink::detached("s1", "test", 2);
        let mut sub = sink.stream().subscribe();

        for i in 0..100 {
            sink.data(serde_json::json!({ "n": i }), HashMap::new());
        }
        sink.complete(serde_json::json!({ "total": 100 }), HashMap::new());

        // The buffer held only the tail of the advisory stream.
        let first = sub.next_advisory().await.unwrap();
        assert_eq!(first.kind, EventKind::Data);
        assert_eq!(first.payload["n"], 98);

        let terminal = sub.terminal().await.unwrap();
        assert_eq!(terminal.kind, EventKind::Complete);
        assert_eq!(terminal.payload["total"], 100);
    }
}
