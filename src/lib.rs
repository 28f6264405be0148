//! reconx - modular reconnaissance engine
//!
//! Pluggable probe modules behind a uniform contract, a scan lifecycle
//! manager with bounded-concurrency fan-out, non-blocking event streaming,
//! and order-independent merging of findings from multiple techniques.

pub mod config;
pub mod error;
pub mod event;
pub mod fanout;
pub mod merge;
pub mod module;
pub mod persist;
pub mod probes;
pub mod scan;
pub mod transport;

// Re-export commonly used types
pub use config::CoreConfig;
pub use error::{ReconError, ReconResult};
pub use event::{Event, EventKind, EventSink, EventStream, EventSubscriber};
pub use fanout::fan_out;
pub use merge::{EmailFinding, MergeMap, Mergeable, SubdomainFinding};
pub use module::registry::builtin_registry;
pub use module::{ModuleInfo, ModuleInput, ModuleRegistry, ModuleStatus, ProbeModule};
pub use persist::{MemoryStore, ScanStore, SessionStore};
pub use scan::manager::ScanManager;
pub use scan::{ScanRecord, ScanStatus};

pub type Result<T> = std::result::Result<T, ReconError>;
