//! Configuration management for keba-control
//!
//! This module handles loading and validation of the YAML configuration:
//! registered stations, control limits, persistence, logging and web binding.

use crate::command::{MAX_CURRENT_A, MIN_CURRENT_A};
use crate::error::{KebaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Environment variable that points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "KEBA_CONTROL_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stations registered at startup
    pub stations: Vec<StationConfig>,

    /// Control and safety limit configuration
    pub controls: ControlsConfig,

    /// Failsafe persistence configuration
    pub persistence: PersistenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Per-station settings supplied by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Station identifier used in every action
    pub id: String,

    /// Host or address of the station (informational, used by the transport)
    pub host: String,

    /// Default RFID tag for start/stop when the caller gives none
    pub rfid: Option<String>,

    /// Default RFID class for start when the caller gives none
    pub rfid_class: Option<String>,

    /// Phases wired at startup (1 or 3)
    pub phases: u8,

    /// Hardware current maximum of this station in amperes
    pub max_current: f32,
}

/// Control and safety limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Lowest current a station accepts while charging
    pub min_current: f32,

    /// Highest current any station accepts
    pub max_current: f32,

    /// Voltage per phase assumed for power to current conversion
    pub line_voltage: f32,

    /// Minimum time between two phase switches of one station
    pub phase_switch_cooldown_seconds: u64,

    /// Per-command transport timeout in milliseconds
    pub transport_timeout_ms: u64,

    /// Capacity of each station's command queue
    pub command_queue_capacity: usize,
}

/// Failsafe persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON file holding persisted failsafe configurations
    pub failsafe_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console level override
    pub console_level: Option<String>,

    /// Optional file level override
    pub file_level: Option<String>,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the env override or the default locations
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            let config = Self::from_file(&path)?;
            config.validate()?;
            return Ok(config);
        }

        let default_paths = ["keba_control.yaml", "/etc/keba-control/config.yaml"];
        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.controls.validate()?;

        let mut seen = std::collections::HashSet::new();
        for (i, station) in self.stations.iter().enumerate() {
            let path = format!("stations[{}]", i);
            station.validate_at(&path, &self.controls)?;
            if !seen.insert(station.id.as_str()) {
                return Err(KebaError::validation(
                    format!("{}.id", path),
                    format!("Duplicate station id {}", station.id),
                ));
            }
        }

        Ok(())
    }
}

impl ControlsConfig {
    /// Check the limits against the hardware envelope
    pub fn validate(&self) -> Result<()> {
        if self.min_current < MIN_CURRENT_A
            || self.max_current > MAX_CURRENT_A
            || self.min_current > self.max_current
        {
            return Err(KebaError::validation(
                "controls.min_current".to_string(),
                format!(
                    "Need {} <= min_current <= max_current <= {}",
                    MIN_CURRENT_A, MAX_CURRENT_A
                ),
            ));
        }
        if self.line_voltage <= 0.0 {
            return Err(KebaError::validation(
                "controls.line_voltage",
                "Must be positive",
            ));
        }
        if self.phase_switch_cooldown_seconds == 0 {
            return Err(KebaError::validation(
                "controls.phase_switch_cooldown_seconds",
                "Must be greater than 0",
            ));
        }
        if self.transport_timeout_ms == 0 {
            return Err(KebaError::validation(
                "controls.transport_timeout_ms",
                "Must be greater than 0",
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(KebaError::validation(
                "controls.command_queue_capacity",
                "Must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl StationConfig {
    /// Check a single station against the control limits
    pub fn validate(&self, controls: &ControlsConfig) -> Result<()> {
        self.validate_at("station", controls)
    }

    fn validate_at(&self, path: &str, controls: &ControlsConfig) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(KebaError::validation(
                format!("{}.id", path),
                "Station id cannot be empty".to_string(),
            ));
        }
        if self.phases != 1 && self.phases != 3 {
            return Err(KebaError::validation(
                format!("{}.phases", path),
                "Must be 1 or 3".to_string(),
            ));
        }
        if self.max_current < controls.min_current || self.max_current > controls.max_current {
            return Err(KebaError::validation(
                format!("{}.max_current", path),
                format!(
                    "Must be within [{}, {}]",
                    controls.min_current, controls.max_current
                ),
            ));
        }
        if self.rfid_class.is_some() && self.rfid.is_none() {
            return Err(KebaError::validation(
                format!("{}.rfid_class", path),
                "Requires rfid".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.stations.is_empty());
        assert_eq!(config.controls.phase_switch_cooldown_seconds, 300);
        assert!((config.controls.line_voltage - 230.0).abs() < f32::EPSILON);
        assert_eq!(config.web.port, 8089);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.stations.push(StationConfig {
            id: "garage".to_string(),
            phases: 2,
            ..Default::default()
        });
        assert!(config.validate().is_err());

        config.stations[0].phases = 3;
        assert!(config.validate().is_ok());

        config.stations.push(StationConfig {
            id: "garage".to_string(),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_station_validation_against_controls() {
        let controls = ControlsConfig::default();
        let station = StationConfig {
            id: "garage".to_string(),
            max_current: 0.0,
            ..Default::default()
        };
        let err = station.validate(&controls).unwrap_err();
        assert!(err.to_string().contains("station.max_current"));

        let station = StationConfig {
            id: "garage".to_string(),
            rfid_class: Some("01010400000000000000".to_string()),
            ..Default::default()
        };
        assert!(station.validate(&controls).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.stations.push(StationConfig {
            id: "carport".to_string(),
            rfid: Some("00845500".to_string()),
            ..Default::default()
        });
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(deserialized.stations.len(), 1);
        assert_eq!(deserialized.stations[0].rfid.as_deref(), Some("00845500"));
    }
}
