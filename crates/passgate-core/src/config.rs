//! Gate configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credential::{ServiceId, Services};
use crate::error::{GateError, Result};
use crate::lockout::RetryPolicy;
use crate::passcode::{PasscodeFormat, MAX_PASSCODE_LENGTH};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "PASSGATE_CONFIG";

/// Gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Number of digits in a passcode
    pub passcode_length: usize,

    /// Consecutive mismatches before the retry window resets
    pub max_attempts: u32,

    /// How long the error flag stays raised after a mismatch (milliseconds)
    pub error_display_ms: u64,

    /// Whether biometric unlock is offered at all
    pub biometry_enabled: bool,

    /// Upper bound on a single secure-store call (seconds)
    pub store_timeout_secs: u64,

    /// Service holding the password record
    pub password_service: String,

    /// Service holding the biometry-protected copy
    pub biometry_service: String,

    /// Account name written into credential records
    pub username: String,

    /// Where the persisted session flag lives
    pub session_path: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            passcode_length: 4,
            max_attempts: 3,
            error_display_ms: 1500,
            biometry_enabled: true,
            store_timeout_secs: 10,
            password_service: "passgate.password".to_string(),
            biometry_service: "passgate.biometry".to_string(),
            username: "passgate".to_string(),
            session_path: Self::default_session_path(),
        }
    }
}

impl GateConfig {
    /// Default config file location, honouring `PASSGATE_CONFIG`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("passgate")
                    .join("config.json")
            })
    }

    fn default_session_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("passgate")
            .join("session.json")
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise write and return the defaults
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the gate cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.passcode_length == 0 || self.passcode_length > MAX_PASSCODE_LENGTH {
            return Err(GateError::Config(format!(
                "passcode_length must be 1-{}",
                MAX_PASSCODE_LENGTH
            )));
        }
        if self.max_attempts == 0 {
            return Err(GateError::Config("max_attempts must be at least 1".into()));
        }
        if self.password_service == self.biometry_service {
            return Err(GateError::Config(
                "password and biometry services must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn passcode_format(&self) -> PasscodeFormat {
        PasscodeFormat::new(self.passcode_length)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            error_display: Duration::from_millis(self.error_display_ms),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            password: ServiceId::new(&self.password_service),
            biometry: ServiceId::new(&self.biometry_service),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_gate_policy() {
        let config = GateConfig::default();
        assert_eq!(config.passcode_length, 4);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_policy().error_display, Duration::from_millis(1500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = GateConfig {
            passcode_length: 6,
            biometry_enabled: false,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = GateConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_attempts": 5 }"#).unwrap();

        let loaded = GateConfig::load(&path).unwrap();
        assert_eq!(loaded.max_attempts, 5);
        assert_eq!(loaded.passcode_length, 4);
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = GateConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, GateConfig::default());
    }

    #[test]
    fn test_validation() {
        let bad_length = GateConfig {
            passcode_length: 0,
            ..Default::default()
        };
        assert!(bad_length.validate().is_err());

        let no_attempts = GateConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(no_attempts.validate().is_err());

        let same_service = GateConfig {
            biometry_service: "passgate.password".into(),
            ..Default::default()
        };
        assert!(same_service.validate().is_err());
    }
}
