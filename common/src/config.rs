// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub engine: EngineSettings,
    pub observability: ObservabilityConfig,
}

/// Engine tuning knobs.
///
/// Both tiers are unbounded by design; the recorder threshold only controls
/// when a warning is emitted, never whether an entry is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Label assigned to tasks scheduled without one.
    pub default_label: String,
    /// Execution-log size at which a warning is logged (entries are never dropped).
    pub recorder_warn_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
}

impl Settings {
    /// Load configuration with layered precedence: defaults -> file -> env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.engine.default_label.is_empty() {
            return Err("Engine default_label cannot be empty".to_string());
        }
        if self.engine.recorder_warn_threshold == 0 {
            return Err("Engine recorder_warn_threshold must be greater than 0".to_string());
        }

        if self.observability.log_level.is_empty() {
            return Err("Observability log_level cannot be empty".to_string());
        }
        if self.observability.metrics_port == 0 {
            return Err("Observability metrics_port must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineSettings {
                default_label: "(anonymous)".to_string(),
                recorder_warn_threshold: 10_000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
            },
        }
    }
}
