//! # Docking Core Configuration
//!
//! Typed configuration for the orchestration engine. Every section has
//! compiled defaults so an empty environment yields a working in-memory
//! setup; files and environment variables only override.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docking_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retries = manager.config().execution.max_retries;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::presets;
use crate::models::{PocketMethod, RunOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockingConfig {
    pub storage: StorageConfig,
    pub pocket: PocketConfig,
    pub execution: ExecutionConfig,
    pub backoff: BackoffConfig,
    pub engine: EngineConfig,
    pub seed: SeedConfig,
    /// Named option bundles; names are matched case-insensitively
    pub presets: PresetTable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Required when `backend = "postgres"`
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Root of the artifact (object) store
    pub object_store_root: PathBuf,
    /// Root of the protein library; receptor paths are relative to it
    pub protein_library_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 10,
            object_store_root: PathBuf::from("data/objects"),
            protein_library_root: PathBuf::from("data/proteins"),
        }
    }
}

/// Binding-box heuristic constants, in Ångström
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketConfig {
    pub padding: f64,
    pub min_size: f64,
    pub default_size: f64,
    pub default_method: PocketMethod,
}

impl Default for PocketConfig {
    fn default() -> Self {
        Self {
            padding: 6.0,
            min_size: 18.0,
            default_size: 20.0,
            default_method: PocketMethod::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Concurrent deliveries per worker pool
    pub worker_concurrency: usize,
    /// Cooperative abort after this many seconds
    pub soft_timeout_seconds: u64,
    /// Delivery future dropped after this many seconds
    pub hard_timeout_seconds: u64,
    /// Redeliveries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Stored task errors are truncated to this many characters
    pub max_error_chars: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            soft_timeout_seconds: 300,
            hard_timeout_seconds: 330,
            max_retries: 2,
            max_error_chars: 1000,
        }
    }
}

impl ExecutionConfig {
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_secs(self.soft_timeout_seconds)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_seconds)
    }
}

/// Dispatch-layer retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl BackoffConfig {
    /// Delay before redelivery number `attempt` (1-based), capped at the maximum
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Deterministic scores, no external binaries
    #[default]
    Mock,
    /// External AutoDock Vina process
    Vina,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreparerKind {
    #[default]
    Placeholder,
    Obabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub vina_binary: String,
    /// Kill the docking process after this many seconds; unset means no limit
    pub process_timeout_seconds: Option<u64>,
    pub preparer: PreparerKind,
    pub obabel_binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Mock,
            vina_binary: "vina".to_string(),
            process_timeout_seconds: None,
            preparer: PreparerKind::Placeholder,
            obabel_binary: "obabel".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Load the protein manifest on startup when the store has no proteins
    pub enabled: bool,
    /// Overrides `<protein_library_root>/manifest.json`
    pub manifest_path: Option<PathBuf>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest_path: None,
        }
    }
}

/// Preset name to option set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetTable(pub BTreeMap<String, RunOptions>);

impl Default for PresetTable {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            presets::FAST.to_string(),
            RunOptions {
                num_conformers: 5,
                exhaustiveness: 4,
                num_poses: 5,
            },
        );
        table.insert(
            presets::BALANCED.to_string(),
            RunOptions {
                num_conformers: 15,
                exhaustiveness: 8,
                num_poses: 10,
            },
        );
        table.insert(
            presets::THOROUGH.to_string(),
            RunOptions {
                num_conformers: 30,
                exhaustiveness: 16,
                num_poses: 20,
            },
        );
        Self(table)
    }
}

impl DockingConfig {
    /// Validate cross-field constraints after all sources are merged
    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage.backend == StorageBackend::Postgres
            && self
                .storage
                .database_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigurationError::validation_error(
                "storage.database_url is required for the postgres backend",
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "storage.max_connections",
                self.storage.max_connections,
                "must be at least 1",
            ));
        }

        for (field, value) in [
            ("pocket.padding", self.pocket.padding),
            ("pocket.min_size", self.pocket.min_size),
            ("pocket.default_size", self.pocket.default_size),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be a finite non-negative length",
                ));
            }
        }

        if self.pocket.default_size <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "pocket.default_size",
                self.pocket.default_size,
                "fallback box must have a positive edge",
            ));
        }

        if self.execution.worker_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.worker_concurrency",
                self.execution.worker_concurrency,
                "must be at least 1",
            ));
        }

        if self.execution.hard_timeout_seconds < self.execution.soft_timeout_seconds {
            return Err(ConfigurationError::invalid_value(
                "execution.hard_timeout_seconds",
                self.execution.hard_timeout_seconds,
                "hard limit must not be below the soft limit",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "must be >= 1.0",
            ));
        }

        if self.presets.0.is_empty() {
            return Err(ConfigurationError::validation_error(
                "at least one preset must be configured",
            ));
        }

        for (name, options) in &self.presets.0 {
            if options.num_conformers == 0 || options.exhaustiveness == 0 || options.num_poses == 0
            {
                return Err(ConfigurationError::invalid_value(
                    format!("presets.{name}"),
                    format!(
                        "{}/{}/{}",
                        options.num_conformers, options.exhaustiveness, options.num_poses
                    ),
                    "every option must be at least 1",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = DockingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pocket.padding, 6.0);
        assert_eq!(config.pocket.min_size, 18.0);
        assert_eq!(config.pocket.default_size, 20.0);
        assert_eq!(config.execution.max_retries, 2);
        assert_eq!(config.presets.0.len(), 3);
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let mut config = DockingConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));

        config.storage.database_url = Some("postgresql://localhost/docking".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hard_timeout_below_soft_is_rejected() {
        let mut config = DockingConfig::default();
        config.execution.hard_timeout_seconds = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let backoff = BackoffConfig {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 500,
        };
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for_attempt(40), Duration::from_millis(500));
    }
}
