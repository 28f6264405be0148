//! Probe module abstraction
//!
//! A probe module is one reconnaissance technique behind a uniform capability
//! set: validate, execute, stop, status. Modules declare their configurable
//! options up front; option maps are checked against that schema when
//! execution starts, not when the input is constructed.

pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::event::EventSink;
use crate::{ReconError, Result};

pub use registry::ModuleRegistry;

/// Value kind of a module option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Int,
    Bool,
    Choice,
}

/// One configurable option declared by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOption {
    pub name: String,
    pub kind: OptionKind,
    pub description: String,
    pub required: bool,
    pub default: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ModuleOption {
    pub fn string(name: &str, description: &str, default: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::String,
            description: description.to_string(),
            required: false,
            default: Value::String(default.to_string()),
            choices: Vec::new(),
        }
    }

    pub fn int(name: &str, description: &str, default: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Int,
            description: description.to_string(),
            required: false,
            default: Value::from(default),
            choices: Vec::new(),
        }
    }

    pub fn bool(name: &str, description: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Bool,
            description: description.to_string(),
            required: false,
            default: Value::Bool(default),
            choices: Vec::new(),
        }
    }

    pub fn choice(name: &str, description: &str, default: &str, choices: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Choice,
            description: description.to_string(),
            required: false,
            default: Value::String(default.to_string()),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.kind {
            OptionKind::String => value.is_string(),
            OptionKind::Int => value.is_i64() || value.is_u64(),
            OptionKind::Bool => value.is_boolean(),
            OptionKind::Choice => value
                .as_str()
                .map(|s| self.choices.iter().any(|c| c == s))
                .unwrap_or(false),
        }
    }
}

/// Static capability descriptor exposed by a module; immutable once registered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub category: String,
    pub description: String,
    pub version: String,
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub options: Vec<ModuleOption>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl ModuleInfo {
    /// Validate caller options against the declared schema and fill defaults
    pub fn resolve_options(&self, supplied: &HashMap<String, Value>) -> Result<ResolvedOptions> {
        let mut resolved = HashMap::new();

        for option in &self.options {
            match supplied.get(&option.name) {
                Some(value) => {
                    if !option.accepts(value) {
                        return Err(ReconError::InvalidOption {
                            name: option.name.clone(),
                            reason: format!("expected {:?} value", option.kind),
                        });
                    }
                    resolved.insert(option.name.clone(), value.clone());
                }
                None if option.required => {
                    return Err(ReconError::InvalidOption {
                        name: option.name.clone(),
                        reason: "required option missing".to_string(),
                    });
                }
                None => {
                    resolved.insert(option.name.clone(), option.default.clone());
                }
            }
        }

        for key in supplied.keys() {
            if !self.options.iter().any(|o| &o.name == key) {
                return Err(ReconError::InvalidOption {
                    name: key.clone(),
                    reason: "not declared by this module".to_string(),
                });
            }
        }

        Ok(ResolvedOptions(resolved))
    }
}

/// Option map after schema validation; every declared option is present
#[derive(Debug, Clone)]
pub struct ResolvedOptions(HashMap<String, Value>);

impl ResolvedOptions {
    pub fn str(&self, name: &str) -> String {
        self.0
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn int(&self, name: &str) -> i64 {
        self.0.get(name).and_then(|v| v.as_i64()).unwrap_or_default()
    }

    pub fn bool(&self, name: &str) -> bool {
        self.0
            .get(name)
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

/// Input for one module execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInput {
    pub target: String,
    #[serde(default)]
    pub options: HashMap<String, Value>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ModuleInput {
    pub fn new(target: &str, session_id: &str) -> Self {
        Self {
            target: target.to_string(),
            options: HashMap::new(),
            session_id: session_id.to_string(),
            timeout: None,
        }
    }

    pub fn with_option(mut self, name: &str, value: Value) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }
}

/// Per-execution lifecycle state of a module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Idle,
    Running,
    Completed,
    Error,
    Stopped,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleState::Idle => "idle",
            ModuleState::Running => "running",
            ModuleState::Completed => "completed",
            ModuleState::Error => "error",
            ModuleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Snapshot of a module instance's current status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub is_running: bool,
    pub progress: f64,
    pub state: ModuleState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

impl Default for ModuleStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            progress: 0.0,
            state: ModuleState::Idle,
            message: String::new(),
            started_at: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// The capability set every reconnaissance technique implements
#[async_trait]
pub trait ProbeModule: Send + Sync {
    /// Static capability descriptor
    fn info(&self) -> ModuleInfo;

    /// Cheap syntactic input checks; must reject before any execution
    /// resources are committed. No network I/O.
    fn validate(&self, input: &ModuleInput) -> Result<()>;

    /// Run to completion or until cancellation is observed. Emits advisory
    /// events through the sink and exactly one terminal `complete` event on
    /// normal return; the returned value is the same full structured result.
    /// A setup failure returns an error without emitting `complete`.
    async fn execute(
        &self,
        cancel: CancellationToken,
        input: ModuleInput,
        sink: EventSink,
    ) -> Result<Value>;

    /// Request cooperative cancellation; idempotent and non-blocking
    fn stop(&self);

    /// Non-blocking status snapshot, readable from any task
    fn status(&self) -> ModuleStatus;
}

struct StatusInner {
    status: ModuleStatus,
    started: Option<Instant>,
}

/// Shared scaffold carried by every built-in module: descriptor, status
/// snapshot, and the execution-scoped cancellation token behind `stop()`.
pub struct BaseModule {
    info: ModuleInfo,
    inner: RwLock<StatusInner>,
    run_token: RwLock<CancellationToken>,
}

impl BaseModule {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            inner: RwLock::new(StatusInner {
                status: ModuleStatus::default(),
                started: None,
            }),
            run_token: RwLock::new(CancellationToken::new()),
        }
    }

    pub fn info(&self) -> ModuleInfo {
        self.info.clone()
    }

    pub fn info_ref(&self) -> &ModuleInfo {
        &self.info
    }

    /// Mark the run started and derive the execution token. The returned
    /// token trips on either the manager's cancellation or `stop()`.
    pub fn begin_run(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        if let Ok(mut guard) = self.run_token.write() {
            *guard = token.clone();
        }

        if let Ok(mut inner) = self.inner.write() {
            inner.started = Some(Instant::now());
            inner.status = ModuleStatus {
                is_running: true,
                progress: 0.0,
                state: ModuleState::Running,
                message: "starting".to_string(),
                started_at: Some(Utc::now()),
                elapsed: Duration::ZERO,
            };
        }

        token
    }

    /// Update progress and message while running. Progress only ever moves
    /// forward and stays below 1.0 until the terminal update.
    pub fn set_progress(&self, progress: f64, message: &str) {
        if let Ok(mut inner) = self.inner.write() {
            if inner.status.state != ModuleState::Running {
                return;
            }
            let capped = progress.clamp(0.0, 0.999);
            inner.status.progress = inner.status.progress.max(capped);
            inner.status.message = message.to_string();
        }
    }

    /// Record the terminal state and fix elapsed time
    pub fn finish_run(&self, state: ModuleState, message: &str) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(started) = inner.started {
                inner.status.elapsed = started.elapsed();
            }
            inner.status.is_running = false;
            inner.status.state = state;
            inner.status.message = message.to_string();
            if state == ModuleState::Completed {
                inner.status.progress = 1.0;
            }
        }
    }

    /// Cooperative stop; safe to call repeatedly, before or after completion
    pub fn request_stop(&self) {
        if let Ok(guard) = self.run_token.read() {
            guard.cancel();
        }

        if let Ok(mut inner) = self.inner.write() {
            if inner.status.is_running {
                if let Some(started) = inner.started {
                    inner.status.elapsed = started.elapsed();
                }
                inner.status.is_running = false;
                inner.status.state = ModuleState::Stopped;
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.run_token
            .read()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    pub fn status(&self) -> ModuleStatus {
        let Ok(inner) = self.inner.read() else {
            return ModuleStatus::default();
        };
        let mut status = inner.status.clone();
        if status.is_running {
            if let Some(started) = inner.started {
                status.elapsed = started.elapsed();
            }
        }
        status
    }

    /// Basic target presence check shared by all modules
    pub fn validate_input(&self, input: &ModuleInput) -> Result<()> {
        if input.target.trim().is_empty() {
            return Err(ReconError::InvalidInput("target is required".to_string()));
        }
        Ok(())
    }
}

/// Cheap syntactic domain shape check used by validators
pub fn looks_like_domain(target: &str) -> bool {
    let target = target.trim().trim_end_matches('.');
    if target.is_empty() || target.len() > 253 || !target.contains('.') {
        return false;
    }
    target.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> ModuleInfo {
        ModuleInfo {
            name: "sample".to_string(),
            category: "test".to_string(),
            description: "sample module".to_string(),
            version: "1.0.0".to_string(),
            author: "reconx".to_string(),
            tags: vec![],
            options: vec![
                ModuleOption::int("threads", "concurrency", 10),
                ModuleOption::bool("banner_grab", "grab banners", true),
                ModuleOption::choice("scan_type", "technique", "tcp_connect", &["tcp_connect"]),
            ],
            requirements: vec!["network".to_string()],
        }
    }

    #[test]
    fn test_defaults_filled_for_missing_options() {
        let info = sample_info();
        let resolved = info.resolve_options(&HashMap::new()).unwrap();
        assert_eq!(resolved.int("threads"), 10);
        assert!(resolved.bool("banner_grab"));
        assert_eq!(resolved.str("scan_type"), "tcp_connect");
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let info = sample_info();
        let mut supplied = HashMap::new();
        supplied.insert("threads".to_string(), Value::String("ten".to_string()));
        assert!(matches!(
            info.resolve_options(&supplied),
            Err(ReconError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_undeclared_option_rejected() {
        let info = sample_info();
        let mut supplied = HashMap::new();
        supplied.insert("bogus".to_string(), Value::Bool(true));
        assert!(info.resolve_options(&supplied).is_err());
    }

    #[test]
    fn test_choice_outside_allowed_set_rejected() {
        let info = sample_info();
        let mut supplied = HashMap::new();
        supplied.insert(
            "scan_type".to_string(),
            Value::String("syn_scan".to_string()),
        );
        assert!(info.resolve_options(&supplied).is_err());
    }

    #[test]
    fn test_base_module_state_machine() {
        let base = BaseModule::new(sample_info());
        assert_eq!(base.status().state, ModuleState::Idle);

        let parent = CancellationToken::new();
        let token = base.begin_run(&parent);
        assert!(base.status().is_running);

        base.set_progress(0.5, "half way");
        base.set_progress(0.3, "stale update");
        assert_eq!(base.status().progress, 0.5);
        assert!(base.status().progress < 1.0);

        base.finish_run(ModuleState::Completed, "done");
        let status = base.status();
        assert!(!status.is_running);
        assert_eq!(status.progress, 1.0);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let base = BaseModule::new(sample_info());
        let parent = CancellationToken::new();
        let token = base.begin_run(&parent);

        base.request_stop();
        base.request_stop();
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
        assert_eq!(base.status().state, ModuleState::Stopped);
    }

    #[test]
    fn test_manager_cancellation_reaches_run_token() {
        let base = BaseModule::new(sample_info());
        let parent = CancellationToken::new();
        let token = base.begin_run(&parent);

        parent.cancel();
        assert!(token.is_cancelled());
        assert!(base.is_stopped());
    }

    #[test]
    fn test_input_option_builder() {
        let input = ModuleInput::new("example.com", "s1").with_option("threads", Value::from(5));
        let resolved = sample_info().resolve_options(&input.options).unwrap();
        assert_eq!(resolved.int("threads"), 5);
    }

    #[test]
    fn test_domain_shape_check() {
        assert!(looks_like_domain("example.com"));
        assert!(looks_like_domain("sub.example.co.uk"));
        assert!(!looks_like_domain("not a domain"));
        assert!(!looks_like_domain("nodots"));
        assert!(!looks_like_domain("-bad.example.com"));
    }
}
