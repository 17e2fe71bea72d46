//! Fan controller data model.
//!
//! These types are shared by every component and carry the invariants the
//! rest of the crate relies on: credentials and names are length-bounded at
//! construction, and fan commands are always a clamped percentage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// Maximum SSID length in bytes (802.11 limit).
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WPA passphrase length in bytes.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Maximum device name length in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Name reported when none has been stored.
pub const DEFAULT_DEVICE_NAME: &str = "fctl";

/// Station connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Station not started or stopped.
    Disconnected,
    /// Connect attempt in flight.
    Connecting,
    /// Attached with an address.
    Connected,
    /// Station retries exhausted; the device broadcasts its own network.
    ApFallback,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ApFallback => "ap_fallback",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating mode of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioMode {
    Station,
    AccessPoint,
}

/// Snapshot of the connectivity state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub state: ConnectionState,
    /// Consecutive failed connect attempts since the last reset.
    pub retry_count: u32,
    /// Address acquired on the most recent successful connection.
    pub last_ip: Option<Ipv4Addr>,
    pub mode: RadioMode,
    /// The manager asked the radio to disconnect and the radio has not
    /// reported it yet. That report is not a failed attempt.
    pub disconnect_pending: bool,
    /// The manager is restarting the station interface; the radio's stop and
    /// start reports for it do not change the state.
    pub restart_pending: bool,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            last_ip: None,
            mode: RadioMode::Station,
            disconnect_pending: false,
            restart_pending: false,
        }
    }
}

impl LinkState {
    /// Mode code reported by the Control API: 0 in station mode, 1 otherwise.
    pub fn mode_code(&self) -> u8 {
        match self.mode {
            RadioMode::Station => 0,
            RadioMode::AccessPoint => 1,
        }
    }
}

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("ssid must not be empty")]
    EmptySsid,

    #[error("ssid is {0} bytes, at most 32 allowed")]
    SsidTooLong(usize),

    #[error("password is {0} bytes, at most 64 allowed")]
    PasswordTooLong(usize),

    #[error("name must not be empty")]
    EmptyName,

    #[error("name is {0} bytes, at most 64 allowed")]
    NameTooLong(usize),
}

/// Credentials of the network the station should join.
#[derive(Clone, PartialEq, Eq)]
pub struct StationCredentials {
    ssid: String,
    password: String,
}

impl StationCredentials {
    /// Validate and build credentials. An empty password means an open network.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let ssid = ssid.into();
        let password = password.into();

        if ssid.is_empty() {
            return Err(ValidationError::EmptySsid);
        }
        if ssid.len() > MAX_SSID_LEN {
            return Err(ValidationError::SsidTooLong(ssid.len()));
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooLong(password.len()));
        }

        Ok(Self { ssid, password })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// Keep passphrases out of logs.
impl fmt::Debug for StationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Cosmetic device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong(name.len()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceName {
    fn default() -> Self {
        Self(DEFAULT_DEVICE_NAME.to_string())
    }
}

/// One access point found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub ssid: String,
    /// RSSI in dBm.
    pub signal_strength: i8,
    pub channel: u8,
}

/// Commanded fan speed, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanCommand {
    speed_percent: u8,
}

impl FanCommand {
    /// Build a command from any integer, clamping it to a percentage.
    pub fn clamped(percent: i64) -> Self {
        Self {
            speed_percent: percent.clamp(0, 100) as u8,
        }
    }

    pub fn speed_percent(&self) -> u8 {
        self.speed_percent
    }
}

/// Pulses counted over one sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedSample {
    pub pulse_count: u32,
    pub window: Duration,
}

impl SpeedSample {
    /// Revolutions per minute for a sensor emitting `pulses_per_revolution`
    /// edges per turn.
    ///
    /// Integer arithmetic in milliseconds: `pulses × 60000 / window_ms / ppr`.
    pub fn rpm(&self, pulses_per_revolution: u32) -> u32 {
        let window_ms = self.window.as_millis().max(1) as u64;
        let ppr = pulses_per_revolution.max(1) as u64;
        let rpm = self.pulse_count as u64 * 60_000 / window_ms / ppr;
        rpm.min(u32::MAX as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_bounds() {
        assert!(StationCredentials::new("a".repeat(32), "p".repeat(64)).is_ok());
        assert_eq!(
            StationCredentials::new("a".repeat(33), ""),
            Err(ValidationError::SsidTooLong(33))
        );
        assert_eq!(
            StationCredentials::new("home", "p".repeat(65)),
            Err(ValidationError::PasswordTooLong(65))
        );
        assert_eq!(
            StationCredentials::new("", "secret"),
            Err(ValidationError::EmptySsid)
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = StationCredentials::new("home", "hunter22").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("home"));
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn test_device_name_bounds() {
        assert_eq!(DeviceName::default().as_str(), "fctl");
        assert_eq!(DeviceName::new(""), Err(ValidationError::EmptyName));
        assert_eq!(
            DeviceName::new("n".repeat(65)),
            Err(ValidationError::NameTooLong(65))
        );
        assert_eq!(DeviceName::new("office").unwrap().as_str(), "office");
    }

    #[test]
    fn test_fan_command_clamps() {
        assert_eq!(FanCommand::clamped(-20).speed_percent(), 0);
        assert_eq!(FanCommand::clamped(42).speed_percent(), 42);
        assert_eq!(FanCommand::clamped(250).speed_percent(), 100);
        assert_eq!(FanCommand::clamped(i64::MAX).speed_percent(), 100);
    }

    #[test]
    fn test_sample_rpm() {
        let sample = SpeedSample {
            pulse_count: 40,
            window: Duration::from_secs(3),
        };
        assert_eq!(sample.rpm(1), 800);
        assert_eq!(sample.rpm(2), 400);

        let idle = SpeedSample {
            pulse_count: 0,
            window: Duration::from_secs(3),
        };
        assert_eq!(idle.rpm(2), 0);
    }

    #[test]
    fn test_mode_code() {
        let mut link = LinkState::default();
        assert_eq!(link.mode_code(), 0);
        link.mode = RadioMode::AccessPoint;
        assert_eq!(link.mode_code(), 1);
    }
}
