//! Control API message types.
//!
//! Requests (client → device):
//! - `SpeedRequest` for `PUT /api/fan/speed`
//! - `NameMessage` for `PUT /api/name`
//! - `StationRequest` for `POST /api/wifi/sta`
//!
//! Responses (device → client) are small single-field objects, plus the
//! `Ack` payload returned by every successful mutation.

use serde::{Deserialize, Serialize};

/// Body of `PUT /api/fan/speed`.
///
/// The value is accepted as any integer and clamped to a percentage by the
/// actuator, so out-of-range commands are not a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedRequest {
    pub speed: i64,
}

/// Response of `GET /api/fan/speed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedResponse {
    pub speed: i32,
}

/// Response of `GET /api/rpm/get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpmResponse {
    pub rpm: u32,
}

/// Body of `PUT /api/name` and response of `GET /api/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMessage {
    pub name: String,
}

/// Body of `POST /api/wifi/sta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRequest {
    pub ssid: String,
    pub password: String,
    /// Also write the credentials to persistent storage.
    #[serde(default)]
    pub save: bool,
}

/// Response of `GET /api/mode/get`: 0 in station mode, 1 otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeResponse {
    pub mode: u8,
}

/// A single entry of the `GET /api/wifi/scan` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i8,
    pub channel: u8,
}

/// Response of `GET /api/wifi/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiStatusResponse {
    /// One of `disconnected`, `connecting`, `connected`, `ap_fallback`.
    pub state: String,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub mode: u8,
}

/// Acknowledgement returned by successful mutating endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_serialization() {
        let json = serde_json::to_string(&Ack::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_station_request_save_defaults_to_false() {
        let req: StationRequest =
            serde_json::from_str(r#"{"ssid":"home","password":"secret"}"#).unwrap();
        assert_eq!(req.ssid, "home");
        assert!(!req.save);
    }

    #[test]
    fn test_wifi_status_omits_missing_ip() {
        let status = WifiStatusResponse {
            state: "connecting".to_string(),
            retry_count: 2,
            ip: None,
            mode: 0,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("ip").is_none());
        assert_eq!(json["retry_count"], 2);
    }

    #[test]
    fn test_scan_entry_field_names() {
        let entry = ScanEntry {
            ssid: "cafe".to_string(),
            rssi: -61,
            channel: 6,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["ssid"], "cafe");
        assert_eq!(json["rssi"], -61);
        assert_eq!(json["channel"], 6);
    }
}
