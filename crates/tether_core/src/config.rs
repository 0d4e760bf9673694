//! Engine configuration presets.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a binding engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of diagnostics retained for inspection (oldest dropped first).
    pub max_diagnostics: usize,
    /// Whether binding loops are logged through `tracing`.
    pub log_binding_loops: bool,
    /// Whether evaluation and assignment errors are logged through `tracing`.
    pub log_binding_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl EngineConfig {
    /// Standard configuration for general use.
    pub fn standard() -> Self {
        Self {
            max_diagnostics: 256,
            log_binding_loops: true,
            log_binding_errors: true,
        }
    }

    /// Quiet configuration: diagnostics are retained but not logged.
    pub fn quiet() -> Self {
        Self {
            max_diagnostics: 256,
            log_binding_loops: false,
            log_binding_errors: false,
        }
    }

    /// Testing configuration with a large retention window.
    pub fn testing() -> Self {
        Self {
            max_diagnostics: 10_000,
            log_binding_loops: true,
            log_binding_errors: true,
        }
    }

    /// Set the diagnostics retention window.
    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }

    /// Enable or disable logging of binding loops.
    pub fn with_loop_logging(mut self, enabled: bool) -> Self {
        self.log_binding_loops = enabled;
        self
    }

    /// Enable or disable logging of binding errors.
    pub fn with_error_logging(mut self, enabled: bool) -> Self {
        self.log_binding_errors = enabled;
        self
    }

    /// Parse a configuration from TOML. Missing keys take standard values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml_str("max_diagnostics = 8\n").unwrap();
        assert_eq!(config.max_diagnostics, 8);
        assert!(config.log_binding_loops);
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(EngineConfig::from_toml_str("max_diagnostics = \"many\"").is_err());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::quiet().with_max_diagnostics(4).with_loop_logging(true);
        assert_eq!(config.max_diagnostics, 4);
        assert!(config.log_binding_loops);
        assert!(!config.log_binding_errors);
    }
}
