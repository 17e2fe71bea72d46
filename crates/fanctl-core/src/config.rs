//! Device configuration.
//!
//! Every field has a default matching the reference hardware, so an empty
//! JSON object (or no file at all) is a valid configuration. The Linux host
//! loads it from the file named by `FANCTL_CONFIG`; the firmware uses the
//! compiled defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::{StationCredentials, DEFAULT_DEVICE_NAME};

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Fan controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// HTTP listen address.
    pub http_addr: String,

    /// Directory served by the static asset endpoint.
    pub web_root: PathBuf,

    /// Persistent store file (Linux host only).
    pub store_path: PathBuf,

    /// Station network used when none is saved in the store.
    pub station_ssid: String,

    /// Password for `station_ssid`, empty for an open network.
    pub station_password: String,

    /// SSID broadcast in access-point fallback.
    pub ap_ssid: String,

    /// Access-point passphrase, empty for an open network.
    pub ap_password: String,

    /// Consecutive connect failures before falling back to access point.
    pub max_retry: u32,

    /// Maximum records returned by a scan.
    pub scan_limit: usize,

    /// Request body scratch buffer capacity in bytes.
    pub scratch_bufsize: usize,

    /// Speed sensor sampling window in milliseconds.
    pub sample_window_ms: u64,

    /// Tachometer edges per fan revolution.
    pub pulses_per_revolution: u32,

    /// PWM duty resolution (255 for an 8-bit timer).
    pub max_duty: u32,

    /// PWM frequency in Hz.
    pub pwm_frequency_hz: u32,

    /// Name reported until one is stored.
    pub default_name: String,

    /// Fan speed applied at boot when none is stored.
    pub initial_speed: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            web_root: PathBuf::from("www"),
            store_path: PathBuf::from("fanctl-store.json"),
            station_ssid: String::new(),
            station_password: String::new(),
            ap_ssid: "fctl".to_string(),
            ap_password: "qwerasdf".to_string(),
            max_retry: crate::wifi::MAX_RETRY,
            scan_limit: crate::wifi::SCAN_LIST_SIZE,
            scratch_bufsize: fanctl_protocol::SCRATCH_BUFSIZE,
            sample_window_ms: 3000,
            pulses_per_revolution: crate::rpm::DEFAULT_PULSES_PER_REVOLUTION,
            max_duty: 255,
            pwm_frequency_hz: 25_000,
            default_name: DEFAULT_DEVICE_NAME.to_string(),
            initial_speed: 10,
        }
    }
}

impl DeviceConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retry == 0 {
            return Err(ConfigError::InvalidValue("max_retry must be at least 1".into()));
        }
        if self.sample_window_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "sample_window_ms must be at least 1".into(),
            ));
        }
        if self.pulses_per_revolution == 0 {
            return Err(ConfigError::InvalidValue(
                "pulses_per_revolution must be at least 1".into(),
            ));
        }
        if self.max_duty == 0 {
            return Err(ConfigError::InvalidValue("max_duty must be at least 1".into()));
        }
        if self.scratch_bufsize < 2 {
            return Err(ConfigError::InvalidValue(
                "scratch_bufsize must be at least 2".into(),
            ));
        }
        if self.ap_ssid.is_empty() || self.ap_ssid.len() > crate::model::MAX_SSID_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "ap_ssid must be 1..={} bytes",
                crate::model::MAX_SSID_LEN
            )));
        }
        // WPA2 passphrases are 8..=63 characters.
        if !self.ap_password.is_empty() && !(8..=63).contains(&self.ap_password.len()) {
            return Err(ConfigError::InvalidValue(
                "ap_password must be empty or 8..=63 bytes".into(),
            ));
        }
        if !self.station_ssid.is_empty() {
            self.station_credentials_unchecked()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }
        Ok(())
    }

    /// Configured station credentials, `None` when no SSID is set.
    pub fn station_credentials(&self) -> Option<StationCredentials> {
        if self.station_ssid.is_empty() {
            return None;
        }
        self.station_credentials_unchecked().ok()
    }

    fn station_credentials_unchecked(
        &self,
    ) -> Result<StationCredentials, crate::model::ValidationError> {
        StationCredentials::new(self.station_ssid.clone(), self.station_password.clone())
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.sample_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_is_default() {
        let config = DeviceConfig::from_json("{}").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.scan_limit, 10);
        assert_eq!(config.scratch_bufsize, 10240);
        assert_eq!(config.sample_window(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_override() {
        let config = DeviceConfig::from_json(
            r#"{"station_ssid":"workshop","station_password":"sawdust1","max_duty":1023}"#,
        )
        .unwrap();

        assert_eq!(config.max_duty, 1023);
        assert_eq!(config.ap_ssid, "fctl");
        let creds = config.station_credentials().unwrap();
        assert_eq!(creds.ssid(), "workshop");
        assert_eq!(creds.password(), "sawdust1");
    }

    #[test]
    fn test_no_station_credentials_by_default() {
        assert!(DeviceConfig::default().station_credentials().is_none());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            DeviceConfig::from_json(r#"{"max_retry":0}"#),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            DeviceConfig::from_json(r#"{"pulses_per_revolution":0}"#),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            DeviceConfig::from_json(r#"{"ap_password":"short"}"#),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            DeviceConfig::from_json(r#"{"max_retry":"five"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = DeviceConfig::load("/nonexistent/fanctl.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
