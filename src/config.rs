//! Configuration module for the reconx engine

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Engine-wide configuration shared by the scan manager and built-in probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Default number of concurrent candidate checks per fan-out phase
    pub default_concurrency: usize,

    /// Default per-operation network timeout in milliseconds
    pub timeout_ms: u64,

    /// Advisory event buffer capacity per scan
    pub event_buffer: usize,

    /// Default cap on merged findings emitted per scan
    pub max_results: usize,

    /// User agent sent with outbound HTTP requests
    pub user_agent: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_concurrency: num_cpus::get() * 16,
            timeout_ms: 2000,
            event_buffer: 256,
            max_results: 100,
            user_agent: "reconx/0.1 (recon engine)".to_string(),
        }
    }
}

impl CoreConfig {
    /// Set the default concurrency limit
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.default_concurrency = limit;
        self
    }

    /// Set the default network timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| crate::ReconError::ConfigError(format!("failed to read config: {}", e)))?;

        let config: CoreConfig = toml::from_str(&content)
            .map_err(|e| crate::ReconError::ConfigError(format!("failed to parse TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `~/.reconx.toml`, falling back to defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let config_path = home_dir.join(".reconx.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.default_concurrency == 0 {
            return Err(crate::ReconError::ConfigError(
                "default_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(crate::ReconError::ConfigError(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(crate::ReconError::ConfigError(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.default_concurrency > 0);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = CoreConfig::default().with_concurrency(0);
        assert!(config.validate().is_err());
    }
}
