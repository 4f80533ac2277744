//! Configuration for click latency measurement.

use crate::collector::Key;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest response window accepted; deadlines must stay representable.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Main configuration.
///
/// Missing fields in the config file fall back to their defaults, so a file
/// may override only the values it cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-pixel mean channel difference (0-255) above which a pixel counts as changed
    pub change_threshold: u8,

    /// Changed-pixel ratio that ends a cycle immediately
    pub strong_ratio: f64,

    /// Lowest ratio still reported as a fallback at timeout
    pub weak_ratio: f64,

    /// How long to wait for a response after each click
    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Sleep between samples; actual spacing adds the capture time
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Extra attempts after a failed capture before the cycle is abandoned
    pub capture_retries: u32,

    /// Pause between capture attempts
    #[serde(with = "duration_serde")]
    pub capture_retry_delay: Duration,

    /// Key that ends a continuous session
    pub stop_key: Key,

    /// Key that arms interactive region selection; clicks before it are ignored
    pub selection_arm_key: Key,

    /// How long interactive region selection waits for a drag
    #[serde(with = "duration_serde")]
    pub selection_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            change_threshold: 8,
            strong_ratio: 0.05,
            weak_ratio: 0.01,
            timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs_f64(1.0 / 60.0),
            capture_retries: 3,
            capture_retry_delay: Duration::from_millis(10),
            stop_key: Key::Escape,
            selection_arm_key: Key::Enter,
            selection_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a configuration document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("click-latency")
            .join("config.json")
    }

    /// Nominal sampling rate implied by the poll interval.
    pub fn poll_rate_hz(&self) -> f64 {
        1.0 / self.poll_interval.as_secs_f64()
    }

    /// Set the poll interval from a sampling rate.
    pub fn set_poll_rate_hz(&mut self, hz: f64) -> Result<(), ConfigError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "poll rate must be positive, got {hz}"
            )));
        }
        self.poll_interval = Duration::from_secs_f64(1.0 / hz);
        Ok(())
    }

    /// Check that the thresholds and timings describe a usable detector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("strong_ratio", self.strong_ratio), ("weak_ratio", self.weak_ratio)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.strong_ratio <= self.weak_ratio {
            return Err(ConfigError::Invalid(format!(
                "strong_ratio ({}) must be greater than weak_ratio ({})",
                self.strong_ratio, self.weak_ratio
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".into()));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "timeout must be at most {}s, got {}s",
                MAX_TIMEOUT.as_secs(),
                self.timeout.as_secs_f64()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be greater than zero".into(),
            ));
        }
        if self.change_threshold == u8::MAX {
            return Err(ConfigError::Invalid(
                "change_threshold 255 can never be exceeded".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.change_threshold, 8);
        assert_eq!(config.strong_ratio, 0.05);
        assert_eq!(config.weak_ratio, 0.01);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!((config.poll_rate_hz() - 60.0).abs() < 1e-6);
        assert_eq!(config.stop_key, Key::Escape);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_json(r#"{ "timeout": 1.5, "strong_ratio": 0.2 }"#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.strong_ratio, 0.2);
        assert_eq!(config.weak_ratio, 0.01);
        assert_eq!(config.capture_retries, 3);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = Config::from_json(r#"{ "timeout": -1.0 }"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_ratio_ordering() {
        let config = Config {
            strong_ratio: 0.01,
            weak_ratio: 0.01,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            strong_ratio: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            weak_ratio: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timings() {
        let config = Config {
            timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            poll_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_timeout() {
        let config = Config {
            timeout: Duration::from_secs(10_000_000_000_000),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            timeout: MAX_TIMEOUT,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_has_no_data_location() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json.get("data_path").is_none());
        assert_eq!(json["selection_arm_key"], "enter");
    }

    #[test]
    fn test_poll_rate_setter() {
        let mut config = Config::default();
        config.set_poll_rate_hz(30.0).unwrap();
        assert!((config.poll_interval.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
        assert!(config.set_poll_rate_hz(0.0).is_err());
    }
}
