//! Engine configuration
//!
//! Loaded from TOML. Every section is optional and falls back to its
//! defaults; only the worker list is required to run a team.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 61499
//!
//! [tap]
//! server_address = "192.168.1.20"
//!
//! [[workers]]
//! name = "conveyor"
//! graph = "apps/conveyor.json"
//! requests = "apps/conveyor.taps.json"
//! ```

use fde_agents::{CoordinatorConfig, WorkerConfig};
use fde_diagnostics::TriggerPolicy;
use fde_graph::TapConfig;
use fde_telemetry::ServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation failed: {0}")]
    Invalid(String),
}

/// One diagnostic worker and the application it looks after
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    /// JSON graph of the application
    pub graph: PathBuf,
    /// JSON list of tap requests
    #[serde(default)]
    pub requests: Option<PathBuf>,
    /// Where to write the deployment plan; logged only when absent
    #[serde(default)]
    pub plan_output: Option<PathBuf>,
    /// Telemetry port for this worker's taps, defaults to `server.port + index`
    #[serde(default)]
    pub port: Option<u16>,
}

/// Top-level engine settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub tap: TapConfig,
    pub trigger: TriggerPolicy,
    pub worker: WorkerConfig,
    pub coordinator: CoordinatorConfig,
    pub workers: Vec<WorkerSpec>,
}

impl EngineConfig {
    /// Read and validate a TOML config file.
    ///
    /// # Errors
    /// I/O, parse or validation failure.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.resolve_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    /// Parse or validation failure.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tap.max_taps > self.server.max_instances {
            return Err(ConfigError::Invalid(format!(
                "tap.max_taps ({}) exceeds server.max_instances ({})",
                self.tap.max_taps, self.server.max_instances
            )));
        }
        if self.server.buffer_size == 0 {
            return Err(ConfigError::Invalid("server.buffer_size must be positive".into()));
        }
        let mut names = HashSet::new();
        for spec in &self.workers {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::Invalid("worker name must not be blank".into()));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate worker {}", spec.name)));
            }
        }
        Ok(())
    }

    /// Telemetry port of the worker at `index`.
    ///
    /// An ephemeral server port (0) stays ephemeral for every worker.
    #[must_use]
    pub fn worker_port(&self, index: usize) -> u16 {
        self.workers
            .get(index)
            .and_then(|w| w.port)
            .unwrap_or_else(|| {
                if self.server.port == 0 {
                    return 0;
                }
                let offset = u16::try_from(index).unwrap_or(u16::MAX);
                self.server.port.saturating_add(offset)
            })
    }

    fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for spec in &mut self.workers {
            rebase(&mut spec.graph);
            if let Some(p) = spec.requests.as_mut() {
                rebase(p);
            }
            if let Some(p) = spec.plan_output.as_mut() {
                rebase(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.server.max_instances, 25);
        assert_eq!(config.trigger.max_retries, 10);
        assert_eq!(config.trigger.delay_ms, 100);
    }

    #[test]
    fn test_rejects_tap_limit_above_instances() {
        let err = EngineConfig::from_toml_str(
            "[server]\nmax_instances = 4\n[tap]\nmax_taps = 5\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_duplicate_worker_names() {
        let err = EngineConfig::from_toml_str(
            "[[workers]]\nname = \"a\"\ngraph = \"g.json\"\n[[workers]]\nname = \"a\"\ngraph = \"h.json\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate worker a"));
    }

    #[test]
    fn worker_ports_default_to_offsets() {
        let config = EngineConfig::from_toml_str(
            "[server]\nport = 7000\n[[workers]]\nname = \"a\"\ngraph = \"a.json\"\n[[workers]]\nname = \"b\"\ngraph = \"b.json\"\nport = 9000\n[[workers]]\nname = \"c\"\ngraph = \"c.json\"\n",
        )
        .unwrap();
        assert_eq!(config.worker_port(0), 7000);
        assert_eq!(config.worker_port(1), 9000);
        assert_eq!(config.worker_port(2), 7002);
    }

    #[test]
    fn ephemeral_server_port_stays_ephemeral_for_every_worker() {
        let config = EngineConfig::from_toml_str(
            "[server]\nport = 0\n[[workers]]\nname = \"a\"\ngraph = \"a.json\"\n[[workers]]\nname = \"b\"\ngraph = \"b.json\"\n[[workers]]\nname = \"c\"\ngraph = \"c.json\"\nport = 9100\n",
        )
        .unwrap();
        assert_eq!(config.worker_port(0), 0);
        assert_eq!(config.worker_port(1), 0);
        assert_eq!(config.worker_port(2), 9100);
    }
}
