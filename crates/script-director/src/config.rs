//! Configuration loading for the script director.
//!
//! All director settings are loaded from a TOML configuration file. Every
//! section is optional; missing values fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use script_events::{DEFAULT_TICK_SECONDS, EVENTS_DOCUMENT, TASKS_DOCUMENT};

/// Complete director configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// Tick clock settings
    #[serde(default)]
    pub clock: ClockConfig,
    /// Trigger polling settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Interaction matching settings
    #[serde(default)]
    pub interaction: InteractionConfig,
    /// Progression persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Signal replication settings
    #[serde(default)]
    pub replication: ReplicationConfig,
}

impl DirectorConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::TomlError)
    }

    /// Serializes this configuration as TOML.
    pub fn to_toml(&self) -> Result<String, TomlSerializeError> {
        toml::to_string_pretty(self).map_err(TomlSerializeError)
    }
}

/// Tick clock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Simulation seconds per tick
    pub tick_seconds: f32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_seconds: DEFAULT_TICK_SECONDS,
        }
    }
}

/// Trigger polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Polling interval, in ticks, for triggers that do not set their own
    pub default_max_polling_interval: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_max_polling_interval: 10,
        }
    }
}

/// Interaction matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Margin added to interaction bounds on every side
    pub bounds_epsilon: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            bounds_epsilon: 0.05,
        }
    }
}

/// Progression persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory holding the progression documents
    pub directory: PathBuf,
    /// Document name for event counters
    pub events_document: String,
    /// Document name for task counters
    pub tasks_document: String,
    /// Save progression when a day rolls over
    pub save_on_rollover: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("progression"),
            events_document: EVENTS_DOCUMENT.to_string(),
            tasks_document: TASKS_DOCUMENT.to_string(),
            save_on_rollover: true,
        }
    }
}

/// Signal replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Queue local signals for other participants
    pub enabled: bool,
    /// Out-of-order sequences held per origin before a gap is abandoned
    pub reorder_window: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reorder_window: 256,
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    IoError(std::io::Error),
    /// Error parsing TOML config
    TomlError(toml::de::Error),
}

/// Error that can occur during TOML serialization.
#[derive(Debug)]
pub struct TomlSerializeError(pub toml::ser::Error);

impl std::fmt::Display for TomlSerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TOML serialize error: {}", self.0)
    }
}

impl std::error::Error for TomlSerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::TomlError(e) => Some(e),
        }
    }
}

/// Generates a default configuration file content.
pub fn default_config_toml() -> String {
    r#"# Script Director Configuration

[clock]
tick_seconds = 0.02

[scheduler]
default_max_polling_interval = 10

[interaction]
bounds_epsilon = 0.05

[persistence]
directory = "progression"
events_document = "events.json"
tasks_document = "tasks.json"
save_on_rollover = true

[replication]
enabled = true
reorder_window = 256
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DirectorConfig::default();

        assert_eq!(config.clock.tick_seconds, 0.02);
        assert_eq!(config.scheduler.default_max_polling_interval, 10);
        assert_eq!(config.interaction.bounds_epsilon, 0.05);
        assert_eq!(config.persistence.events_document, "events.json");
        assert!(config.replication.enabled);
    }

    #[test]
    fn test_parse_config_from_toml() {
        let toml = r#"
            [scheduler]
            default_max_polling_interval = 4

            [persistence]
            directory = "/var/lib/saves"
            save_on_rollover = false
        "#;

        let config = DirectorConfig::from_str(toml).unwrap();

        assert_eq!(config.scheduler.default_max_polling_interval, 4);
        assert_eq!(config.persistence.directory, PathBuf::from("/var/lib/saves"));
        assert!(!config.persistence.save_on_rollover);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
            [interaction]
            bounds_epsilon = 0.2
        "#;

        let config = DirectorConfig::from_str(toml).unwrap();

        // Specified value
        assert_eq!(config.interaction.bounds_epsilon, 0.2);
        // Default values
        assert_eq!(config.persistence.tasks_document, "tasks.json");
        assert_eq!(config.replication.reorder_window, 256);
    }

    #[test]
    fn test_config_to_toml() {
        let config = DirectorConfig::default();
        let toml = config.to_toml().unwrap();

        assert!(toml.contains("[clock]"));
        assert!(toml.contains("[scheduler]"));
        assert!(toml.contains("[persistence]"));
    }

    #[test]
    fn test_default_config_toml_parses() {
        let toml = default_config_toml();
        let config = DirectorConfig::from_str(&toml).unwrap();

        assert_eq!(config.clock.tick_seconds, 0.02);
        assert_eq!(config.scheduler.default_max_polling_interval, 10);
        assert_eq!(config.persistence.directory, PathBuf::from("progression"));
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let err = DirectorConfig::from_str("[scheduler\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
        assert!(err.to_string().starts_with("TOML parse error"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = DirectorConfig::from_file(Path::new("/nonexistent/director.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
