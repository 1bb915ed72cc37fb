//! Configuration for the night wander agent.
//!
//! [`Config`] is the persisted JSON file. [`Settings`] is the validated,
//! read-only snapshot the detector works from; a configuration change
//! builds a new snapshot and swaps it in whole.

use crate::adaptor::{SensorConfig, SensorRegistry};
use crate::core::{NightWindow, PolicyKind, WallClock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 2015-01-01T00:00:00Z. Earlier timestamps mean the clock is not set yet.
pub const DEFAULT_MIN_VALID_TIMESTAMP: f64 = 1_420_070_400.0;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bridge identifier used to scope metric series
    pub bridge_id: String,

    /// Instance identifier, keys the rollup recovery file
    pub instance_id: String,

    /// Night window start, "HH:MM"
    pub night_start: String,

    /// Night window end, "HH:MM"
    pub night_end: String,

    /// Debounce interval in seconds
    #[serde(rename = "night_ignore_time")]
    pub debounce_secs: u64,

    /// Metric coalescing delay in seconds
    #[serde(rename = "data_send_delay")]
    pub data_send_delay_secs: u64,

    /// Correlation policy
    pub policy: PolicyKind,

    /// IANA timezone for the night window; host local time when unset
    pub timezone: Option<String>,

    /// Events before this epoch second do not produce metric samples
    pub min_valid_timestamp: f64,

    /// Sensors by adaptor id
    pub sensors: BTreeMap<String, SensorConfig>,

    /// Path for storing the rollup recovery file
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("night-wander");

        let bridge_id = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "bridge".to_string());

        Self {
            bridge_id,
            instance_id: "night_wander".to_string(),
            night_start: "23:00".to_string(),
            night_end: "07:00".to_string(),
            debounce_secs: 600, // 10 minutes
            data_send_delay_secs: 1,
            policy: PolicyKind::default(),
            timezone: None,
            min_valid_timestamp: DEFAULT_MIN_VALID_TIMESTAMP,
            sensors: BTreeMap::new(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("night-wander")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Shallow merge: each top-level key in `update` replaces the current value.
    pub fn merged(&self, update: &serde_json::Value) -> Result<Config, ConfigError> {
        let update = update.as_object().ok_or_else(|| {
            ConfigError::ParseError("config update must be a JSON object".to_string())
        })?;

        let mut current =
            serde_json::to_value(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        if let Some(fields) = current.as_object_mut() {
            for (key, value) in update {
                fields.insert(key.clone(), value.clone());
            }
        }

        serde_json::from_value(current).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply a config update sent by the remote service.
    ///
    /// Updates carrying a `warning` key are logged and ignored. Otherwise the
    /// merged config is saved to `path` and adopted if it differs from the
    /// current one or the file does not exist yet. Returns whether the
    /// config was replaced.
    pub fn apply_update(
        &mut self,
        update: &serde_json::Value,
        path: &Path,
    ) -> Result<bool, ConfigError> {
        if let Some(warning) = update.get("warning") {
            tracing::warn!("Config update rejected by service: {warning}");
            return Ok(false);
        }

        let merged = self.merged(update)?;
        if merged == *self && path.exists() {
            return Ok(false);
        }

        merged.save_to(path)?;
        *self = merged;
        tracing::info!("Config updated");
        Ok(true)
    }
}

/// Validated snapshot of the configuration used by the detector.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bridge_id: String,
    pub instance_id: String,
    /// `None` when the configured boundaries are invalid
    pub window: Option<NightWindow>,
    pub clock: WallClock,
    pub debounce_secs: f64,
    pub data_send_delay_secs: f64,
    pub policy: PolicyKind,
    pub min_valid_timestamp: f64,
    pub registry: SensorRegistry,
    pub data_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bridge_id: "bridge".to_string(),
            instance_id: "night_wander".to_string(),
            window: NightWindow::parse("23:00", "07:00").ok(),
            clock: WallClock::Local,
            debounce_secs: 600.0,
            data_send_delay_secs: 1.0,
            policy: PolicyKind::default(),
            min_valid_timestamp: DEFAULT_MIN_VALID_TIMESTAMP,
            registry: SensorRegistry::default(),
            data_path: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Build a snapshot from `config`.
    ///
    /// Invalid window boundaries leave the window unset and an unknown zone
    /// falls back to local time. Both are logged; the agent keeps running.
    pub fn from_config(config: &Config) -> Self {
        let window = match NightWindow::parse(&config.night_start, &config.night_end) {
            Ok(window) => Some(window),
            Err(e) => {
                tracing::error!("Night window disabled: {e}");
                None
            }
        };

        let clock = WallClock::from_name(config.timezone.as_deref()).unwrap_or_else(|e| {
            tracing::error!("{e}; using local time");
            WallClock::Local
        });

        Self {
            bridge_id: config.bridge_id.clone(),
            instance_id: config.instance_id.clone(),
            window,
            clock,
            debounce_secs: config.debounce_secs as f64,
            data_send_delay_secs: config.data_send_delay_secs as f64,
            policy: config.policy,
            min_valid_timestamp: config.min_valid_timestamp,
            registry: SensorRegistry::from_config(&config.sensors),
            data_path: config.data_path.clone(),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.night_start, "23:00");
        assert_eq!(config.night_end, "07:00");
        assert_eq!(config.debounce_secs, 600);
        assert_eq!(config.policy, PolicyKind::Session);
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn test_wire_names() {
        let config: Config = serde_json::from_value(json!({
            "night_start": "22:30",
            "night_ignore_time": 300,
            "data_send_delay": 5,
            "policy": "cooldown",
            "sensors": {"ADT1": {"name": "Hall PIR"}}
        }))
        .unwrap();
        assert_eq!(config.night_start, "22:30");
        assert_eq!(config.night_end, "07:00");
        assert_eq!(config.debounce_secs, 300);
        assert_eq!(config.data_send_delay_secs, 5);
        assert_eq!(config.policy, PolicyKind::Cooldown);
        assert!(!config.sensors["ADT1"].inverted);
    }

    #[test]
    fn test_merge_replaces_top_level_keys() {
        let config = Config::default();
        let merged = config
            .merged(&json!({"night_end": "06:30", "timezone": "Europe/London"}))
            .unwrap();
        assert_eq!(merged.night_end, "06:30");
        assert_eq!(merged.timezone.as_deref(), Some("Europe/London"));
        assert_eq!(merged.night_start, config.night_start);

        assert!(config.merged(&json!(["not", "an", "object"])).is_err());
        assert!(config.merged(&json!({"night_ignore_time": "soon"})).is_err());
    }

    #[test]
    fn test_apply_update_saves_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();

        assert!(config
            .apply_update(&json!({"night_start": "22:00"}), &path)
            .unwrap());
        assert_eq!(config.night_start, "22:00");
        assert_eq!(Config::load_from(&path).unwrap(), config);

        // Same values again: nothing to do.
        assert!(!config
            .apply_update(&json!({"night_start": "22:00"}), &path)
            .unwrap());

        // Service warnings are not applied.
        assert!(!config
            .apply_update(&json!({"warning": "unknown app"}), &path)
            .unwrap());
    }

    #[test]
    fn test_settings_degrade_on_bad_values() {
        let config = Config {
            night_start: "late".to_string(),
            timezone: Some("Nowhere/Special".to_string()),
            ..Config::default()
        };
        let settings = Settings::from_config(&config);
        assert!(settings.window.is_none());
        assert_eq!(settings.clock, WallClock::Local);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config
            .sensors
            .insert("ADT1".to_string(), SensorConfig::new("Landing PIR"));
        config.timezone = Some("UTC".to_string());

        let settings = Settings::from_config(&config);
        assert_eq!(settings.window, NightWindow::parse("23:00", "07:00").ok());
        assert_eq!(settings.clock, WallClock::Zone(chrono_tz::UTC));
        assert_eq!(settings.debounce_secs, 600.0);
        assert_eq!(settings.registry.label("ADT1"), Some("Landing_PIR"));
    }
}
