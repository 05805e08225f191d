//! Configuration management (TOML)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "NIGHTMOTHER_CONFIG";
pub const DEFAULT_CPU_THRESHOLD: f64 = 70.0;
pub const DEFAULT_SAMPLE_WINDOW_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Seconds between the end of one tick and the start of the next.
    pub check_interval: f64,
    #[serde(default = "default_sample_window_ms")]
    pub sample_window_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold_percent: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cpu_threshold_percent: DEFAULT_CPU_THRESHOLD,
        }
    }
}

fn default_cpu_threshold() -> f64 {
    DEFAULT_CPU_THRESHOLD
}

fn default_sample_window_ms() -> u64 {
    DEFAULT_SAMPLE_WINDOW_MS
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.file.as_os_str().is_empty() {
            return Err(invalid("logging.file", "path is empty"));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(invalid("database.path", "path is empty"));
        }
        self.check_interval()?;
        if self.agent.sample_window_ms == 0 {
            return Err(invalid("agent.sample_window_ms", "must be greater than zero"));
        }
        let threshold = self.detection.cpu_threshold_percent;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(invalid(
                "detection.cpu_threshold_percent",
                format!("{threshold} is not a non-negative number"),
            ));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Result<Duration, ConfigError> {
        let secs = self.agent.check_interval;
        if !(secs.is_finite() && secs > 0.0) {
            return Err(invalid(
                "agent.check_interval",
                format!("{secs} is not a positive number of seconds"),
            ));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| invalid("agent.check_interval", e.to_string()))
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.agent.sample_window_ms)
    }

    /// `$NIGHTMOTHER_CONFIG`, falling back to `config/config.toml` under the working directory.
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config").join("config.toml"))
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}
