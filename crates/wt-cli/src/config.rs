//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wt_core::{IdleConfig, IdleStopPolicy, StaticCatalog};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Path to the activity catalog (JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Task name used when the timer is started without one.
    pub placeholder_task: String,

    /// Redraw period of the live surfaces, in milliseconds.
    pub tick_millis: u64,

    /// Idle detection settings.
    pub idle: IdleSettings,
}

/// Idle detection settings as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleSettings {
    /// Disable to run without idle detection.
    pub enabled: bool,
    /// Minutes without input before the idle alert.
    pub threshold_minutes: u32,
    /// Seconds between idle checks.
    pub poll_interval_secs: u64,
    /// What `idle-stop` keeps of the idle stretch.
    pub stop_policy: IdleStopPolicy,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_minutes: 5,
            poll_interval_secs: 30,
            stop_policy: IdleStopPolicy::IncludeIdle,
        }
    }
}

impl IdleSettings {
    /// Converts to the monitor's settings.
    pub fn to_idle_config(&self) -> IdleConfig {
        IdleConfig {
            threshold: chrono::Duration::minutes(i64::from(self.threshold_minutes)),
            poll_interval: StdDuration::from_secs(self.poll_interval_secs.max(1)),
            stop_policy: self.stop_policy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("wt.db"),
            catalog_path: None,
            placeholder_task: wt_core::store::DEFAULT_PLACEHOLDER_TASK.to_string(),
            tick_millis: 1000,
            idle: IdleSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (WT_*, nested keys split on __)
        figment = figment.merge(Env::prefixed("WT_").split("__"));

        figment.extract()
    }

    /// Redraw period of the live surfaces.
    pub fn tick_period(&self) -> StdDuration {
        StdDuration::from_millis(self.tick_millis.max(10))
    }

    /// Loads the activity catalog.
    ///
    /// Uses `catalog_path` when set, then `catalog.json` in the config
    /// directory. With neither present the catalog is empty.
    pub fn load_catalog(&self) -> Result<StaticCatalog> {
        let path = match &self.catalog_path {
            Some(path) => path.clone(),
            None => match dirs_config_path().map(|dir| dir.join("catalog.json")) {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("no catalog configured; using an empty catalog");
                    return Ok(StaticCatalog::default());
                }
            },
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog: StaticCatalog = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        tracing::debug!(items = catalog.len(), path = %path.display(), "loaded catalog");
        Ok(catalog)
    }
}

/// Returns the platform-specific config directory for wt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wt"))
}

/// Returns the platform-specific data directory for wt.
///
/// On Linux: `~/.local/share/wt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wt"))
}
