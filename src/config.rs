//! Engine configuration
//!
//! Read from `converge.toml` in the config directory:
//!
//! ```toml
//! app = "shop"
//! stage = "dev"
//! state_dir = "~/.local/state/shop"
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 200
//! backoff_factor = 2.0
//! max_delay_ms = 30000
//! jitter = 0.25
//! ```

use anyhow::{Context, Result};
use declarative::{Engine, RetryConfig, Scope};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::paths;
use crate::state::FileStateStore;

/// File name looked up by [`EngineConfig::discover`]
pub const CONFIG_FILE: &str = "converge.toml";

/// Environment variable overriding the configured stage
pub const ENV_STAGE: &str = "CONVERGE_STAGE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application name; first component of every physical name
    pub app: String,
    /// Deployment stage, e.g. `dev` or `prod`
    pub stage: String,
    /// Where the file store keeps records. Defaults to [`paths::state_dir`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
    /// Backoff policy for provider calls
    pub retry: RetrySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app: "app".to_string(),
            stage: "dev".to_string(),
            state_dir: None,
            retry: RetrySettings::default(),
        }
    }
}

/// The `[retry]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            backoff_factor: settings.backoff_factor.max(1.0),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: 0.0,
        }
        .with_jitter(settings.jitter)
    }
}

impl EngineConfig {
    /// Load a config file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.apply_env(&|key| std::env::var(key).ok());
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a config without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML")
    }

    /// Load `converge.toml` from the config directory, or use defaults
    pub fn discover() -> Result<Self> {
        let path = paths::config_dir()?.join(CONFIG_FILE);
        if path.exists() {
            return Self::load(&path);
        }

        log::debug!("No config at {}, using defaults", path.display());
        let mut config = Self::default();
        config.apply_env(&|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(stage) = env(ENV_STAGE).filter(|s| !s.is_empty()) {
            log::debug!("Stage overridden by {ENV_STAGE}: {stage}");
            self.stage = stage;
        }
        if let Some(dir) = env(paths::ENV_STATE_DIR).filter(|s| !s.is_empty()) {
            self.state_dir = Some(dir);
        }
    }

    /// Retry policy for provider calls
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    /// Resolved state directory, with `~` and variables expanded
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    /// Root scope for this app and stage
    pub fn root_scope(&self) -> Scope {
        Scope::root(&self.app, &self.stage)
    }

    /// File store at the resolved state directory
    pub fn file_store(&self) -> Result<FileStateStore> {
        Ok(FileStateStore::new(self.state_path()?))
    }

    /// Engine persisting to [`EngineConfig::file_store`]
    pub fn engine(&self) -> Result<Engine> {
        Ok(Engine::new(Arc::new(self.file_store()?)))
    }
}
