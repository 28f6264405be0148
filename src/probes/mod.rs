//! Built-in probe modules
//!
//! Five reconnaissance techniques behind the `ProbeModule` contract. Each one
//! runs its candidate checks through the shared fan-out primitive; they
//! differ only in what a single check does.

pub mod domain_enum;
pub mod email_enum;
pub mod network_recon;
pub mod port_scan;
pub mod service_names;
pub mod web_enum;
pub mod wordlists;

pub use domain_enum::DomainEnumModule;
pub use email_enum::EmailEnumModule;
pub use network_recon::NetworkReconModule;
pub use port_scan::PortScanModule;
pub use web_enum::WebEnumModule;
