//! Service configuration (TOML)

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an alternate config file
pub const CONFIG_ENV_VAR: &str = "POWERSPIKE_CONFIG";

/// Top-level configuration, one table per concern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Get the configuration file path
    ///
    /// `POWERSPIKE_CONFIG` wins over the platform config directory.
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join("powerspike-monitor");

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from disk, writing defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, writing defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            log::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.general.appliance_id.trim().is_empty() {
            return Err(Error::Config("general.appliance_id must not be empty".to_string()));
        }
        if self.training.window_size == 0 {
            return Err(Error::Config("training.window_size must be at least 1".to_string()));
        }
        if self.training.history_days == 0 {
            return Err(Error::Config("training.history_days must be at least 1".to_string()));
        }
        if !self.forecast.threshold_factor.is_finite() || self.forecast.threshold_factor <= 0.0 {
            return Err(Error::Config(format!(
                "forecast.threshold_factor must be positive, got {}",
                self.forecast.threshold_factor
            )));
        }
        if self.schedule.regenerate_interval_secs == 0 || self.schedule.retrain_interval_secs == 0 {
            return Err(Error::Config("schedule intervals must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Directory holding the database and model artifacts
    pub fn data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.general.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?
                .join("powerspike-monitor"),
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Appliance the model is trained for
    #[serde(default = "default_appliance_id")]
    pub appliance_id: String,
    /// Overrides the platform data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_appliance_id() -> String { "laptop".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            appliance_id: default_appliance_id(),
            data_dir: None,
        }
    }
}

/// Baseline training settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Moving-average window in one-minute samples
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Training is refused below this many samples
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Rolling history window used for retraining
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

fn default_window_size() -> usize { 15 }
fn default_min_samples() -> usize { 100 }
fn default_history_days() -> u32 { 30 }

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_samples: default_min_samples(),
            history_days: default_history_days(),
        }
    }
}

/// Forecast settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// spike_threshold = expected_power * threshold_factor
    #[serde(default = "default_threshold_factor")]
    pub threshold_factor: f64,
}

fn default_threshold_factor() -> f64 { 1.5 }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            threshold_factor: default_threshold_factor(),
        }
    }
}

/// Scheduler cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Forecast regeneration period
    #[serde(default = "default_regenerate_interval")]
    pub regenerate_interval_secs: u64,
    /// Full retraining period
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_secs: u64,
}

fn default_regenerate_interval() -> u64 { 3600 }
fn default_retrain_interval() -> u64 { 86_400 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            regenerate_interval_secs: default_regenerate_interval(),
            retrain_interval_secs: default_retrain_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.general.appliance_id, "laptop");
        assert_eq!(config.training.window_size, 15);
        assert_eq!(config.training.min_samples, 100);
        assert_eq!(config.training.history_days, 30);
        assert_eq!(config.forecast.threshold_factor, 1.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [general]
            appliance_id = "fridge"

            [training]
            window_size = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.general.appliance_id, "fridge");
        assert_eq!(config.training.window_size, 5);
        assert_eq!(config.training.min_samples, 100);
        assert_eq!(config.schedule.regenerate_interval_secs, 3600);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml("[training]\nwindow_size = 0").is_err());
        assert!(Config::from_toml("[forecast]\nthreshold_factor = 0.0").is_err());
        assert!(Config::from_toml("[schedule]\nretrain_interval_secs = 0").is_err());
        assert!(Config::from_toml("[general]\nappliance_id = \"\"").is_err());
    }

    #[test]
    fn test_load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        fs::write(&path, "[forecast]\nthreshold_factor = 2.0\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().forecast.threshold_factor, 2.0);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::default();
        let content = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_toml(&content).unwrap(), config);
    }
}
