//! Process-wide catalogue of probe modules
//!
//! Registration happens once at startup; lookups are frequent and concurrent.
//! Registering a second module under an existing name replaces it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{ModuleInfo, ProbeModule};
use crate::config::CoreConfig;
use crate::probes;

/// Read-mostly name → module catalogue
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<dyn ProbeModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a module under its declared name; last writer wins
    pub fn register(&self, module: Arc<dyn ProbeModule>) {
        let name = module.info().name;
        if let Ok(mut modules) = self.modules.write() {
            if modules.insert(name.clone(), module).is_some() {
                log::debug!("module '{}' replaced in registry", name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProbeModule>> {
        self.modules.read().ok()?.get(name).cloned()
    }

    /// Snapshot of all registered modules
    pub fn list(&self) -> HashMap<String, Arc<dyn ProbeModule>> {
        self.modules
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Snapshot of modules in one category
    pub fn list_by_category(&self, category: &str) -> HashMap<String, Arc<dyn ProbeModule>> {
        self.modules
            .read()
            .map(|modules| {
                modules
                    .iter()
                    .filter(|(_, module)| module.info().category == category)
                    .map(|(name, module)| (name.clone(), module.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All categories with at least one registered module, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .modules
            .read()
            .map(|modules| {
                modules
                    .values()
                    .map(|module| module.info().category)
                    .collect::<std::collections::HashSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        categories.sort();
        categories
    }

    /// Descriptors of every registered module
    pub fn descriptors(&self) -> HashMap<String, ModuleInfo> {
        self.modules
            .read()
            .map(|modules| {
                modules
                    .iter()
                    .map(|(name, module)| (name.clone(), module.info()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.modules.read().map(|m| m.len()).unwrap_or(0)
    }
}

/// Construct a registry holding the built-in probe modules. Called once at
/// process start, before any scan; no load-time side effects.
pub fn builtin_registry(config: &CoreConfig) -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::new();

    registry.register(Arc::new(probes::PortScanModule::new(config)));
    registry.register(Arc::new(probes::DomainEnumModule::new(config)));
    registry.register(Arc::new(probes::WebEnumModule::new(config)));
    registry.register(Arc::new(probes::EmailEnumModule::new(config)));
    registry.register(Arc::new(probes::NetworkReconModule::new(config)));

    log::info!("registered {} built-in modules", registry.count());
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    #[test]
    fn test_builtin_modules_registered() {
        let registry = builtin_registry(&CoreConfig::default());
        assert_eq!(registry.count(), 5);
        assert!(registry.get("port_scan").is_some());
        assert!(registry.get("domain_enum").is_some());
        assert!(registry.get("web_enum").is_some());
        assert!(registry.get("email_enum").is_some());
        assert!(registry.get("network_recon").is_some());
        assert!(registry.get("no_such_module").is_none());
    }

    #[test]
    fn test_list_by_category_is_snapshot() {
        let registry = builtin_registry(&CoreConfig::default());
        let active = registry.list_by_category("active_recon");
        assert!(active.contains_key("port_scan"));
        assert!(active.contains_key("web_enum"));
        assert!(!active.contains_key("email_enum"));

        let categories = registry.categories();
        assert!(categories.contains(&"active_recon".to_string()));
        assert!(categories.contains(&"passive_osint".to_string()));
    }
}
