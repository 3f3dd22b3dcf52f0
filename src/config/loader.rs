//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are merged
//! in order: compiled defaults, then an optional TOML file, then environment
//! variables prefixed with `DOCKING__` (nested keys separated by `__`, e.g.
//! `DOCKING__EXECUTION__MAX_RETRIES=5`).

use super::error::{ConfigResult, ConfigurationError};
use super::DockingConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "DOCKING";

/// Explicit config file path, consulted when no path is passed in
pub const CONFIG_PATH_VAR: &str = "DOCKING_CONFIG";

pub struct ConfigManager {
    config: DockingConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let explicit = env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        Self::load_from_file(explicit.as_deref())
    }

    /// Load configuration from a specific file.
    ///
    /// `None` falls back to `config/docking.toml` and `config/docking.<env>.toml`
    /// when they exist; an explicit path that does not exist is an error.
    pub fn load_from_file(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let source_file = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.display().to_string(),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover_config_file(&environment),
        };

        debug!(
            environment = %environment,
            file = ?source_file,
            "Loading docking configuration"
        );

        let config = Self::build(source_file.as_deref(), true)?;
        config.validate()?;

        info!(
            environment = %environment,
            backend = ?config.storage.backend,
            engine = ?config.engine.kind,
            workers = config.execution.worker_concurrency,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_file,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: DockingConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_file: None,
        }))
    }

    /// Merge defaults, an optional file and (optionally) the environment
    fn build(file: Option<&Path>, include_env: bool) -> ConfigResult<DockingConfig> {
        let defaults = Config::try_from(&DockingConfig::default())?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(true));
        }

        if include_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let merged = builder.build()?;
        Ok(merged.try_deserialize::<DockingConfig>()?)
    }

    /// Parse a TOML document over the defaults, ignoring the environment
    pub fn parse_toml(contents: &str) -> ConfigResult<DockingConfig> {
        let defaults = Config::try_from(&DockingConfig::default())?;
        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        let config = merged.try_deserialize::<DockingConfig>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &DockingConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    fn detect_environment() -> String {
        env::var("DOCKING_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn discover_config_file(environment: &str) -> Option<PathBuf> {
        [
            PathBuf::from(format!("config/docking.{environment}.toml")),
            PathBuf::from("config/docking.toml"),
        ]
        .into_iter()
        .find(|candidate| candidate.exists())
    }
}
