//! Control API handler logic (framework-agnostic).
//!
//! These functions contain the business logic for the `/api/*` endpoints.
//! Framework-specific code (axum on Linux, esp-idf-svc on the device) wraps
//! them with its own request/response types, passing raw body bytes in and
//! serializing the returned protocol messages out.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use fanctl_protocol::{
    decode_body, Ack, CodecError, ErrorResponse, ModeResponse, NameMessage, RpmResponse,
    ScanEntry, SpeedRequest, SpeedResponse, StationRequest, WifiStatusResponse,
};

use crate::config::DeviceConfig;
use crate::fan::{indicator_hue, FanDriver, Indicator};
use crate::model::{DeviceName, FanCommand, StationCredentials, ValidationError};
use crate::rpm::SpeedSensor;
use crate::store::{KvStore, StoreError, KEY_FAN_SPEED, KEY_NAME, KEY_STA_PASSWORD, KEY_STA_SSID};
use crate::wifi::WifiControl;

/// Errors surfaced to API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// An oversized body is a server error (the scratch buffer is a server
    /// limit); bad input is a client error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Codec(CodecError::BodyTooLarge { .. }) => 500,
            ApiError::Codec(CodecError::InvalidJson(_)) => 400,
            ApiError::Validation(_) => 400,
            ApiError::Storage(_) => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.to_string())
    }
}

/// The device components the Control API operates on.
#[derive(Clone)]
pub struct ControlApi {
    store: Arc<dyn KvStore>,
    fan: Arc<FanDriver>,
    indicator: Arc<dyn Indicator>,
    sensor: Arc<SpeedSensor>,
    wifi: Arc<dyn WifiControl>,
    default_name: String,
    scratch_bufsize: usize,
    scan_limit: usize,
}

impl ControlApi {
    pub fn new(
        config: &DeviceConfig,
        store: Arc<dyn KvStore>,
        fan: Arc<FanDriver>,
        indicator: Arc<dyn Indicator>,
        sensor: Arc<SpeedSensor>,
        wifi: Arc<dyn WifiControl>,
    ) -> Self {
        Self {
            store,
            fan,
            indicator,
            sensor,
            wifi,
            default_name: config.default_name.clone(),
            scratch_bufsize: config.scratch_bufsize,
            scan_limit: config.scan_limit,
        }
    }

    pub fn scratch_bufsize(&self) -> usize {
        self.scratch_bufsize
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn fan(&self) -> &Arc<FanDriver> {
        &self.fan
    }

    pub fn sensor(&self) -> &Arc<SpeedSensor> {
        &self.sensor
    }

    pub fn wifi(&self) -> &Arc<dyn WifiControl> {
        &self.wifi
    }

    /// GET /api/rpm/get
    pub fn get_rpm(&self) -> RpmResponse {
        RpmResponse {
            rpm: self.sensor.rpm(),
        }
    }

    /// GET /api/fan/speed
    ///
    /// Reports 0 when nothing is stored or the store cannot be read.
    pub fn get_fan_speed(&self) -> SpeedResponse {
        let speed = match self.store.get_int(KEY_FAN_SPEED) {
            Ok(Some(speed)) => speed,
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to read fan speed: {}", e);
                0
            }
        };
        SpeedResponse { speed }
    }

    /// PUT /api/fan/speed
    pub fn put_fan_speed(&self, body: &[u8]) -> Result<Ack, ApiError> {
        let req: SpeedRequest = decode_body(body, self.scratch_bufsize)?;
        let command = FanCommand::clamped(req.speed);
        info!("Fan control: speed = {}", command.speed_percent());

        self.store
            .set_int(KEY_FAN_SPEED, command.speed_percent() as i32)?;
        self.apply_speed(command);
        Ok(Ack::ok())
    }

    /// GET /api/name
    pub fn get_name(&self) -> NameMessage {
        let name = match self.store.get_str(KEY_NAME) {
            Ok(Some(name)) => name,
            Ok(None) => self.default_name.clone(),
            Err(e) => {
                warn!("Failed to read device name: {}", e);
                self.default_name.clone()
            }
        };
        NameMessage { name }
    }

    /// PUT /api/name
    pub fn put_name(&self, body: &[u8]) -> Result<Ack, ApiError> {
        let req: NameMessage = decode_body(body, self.scratch_bufsize)?;
        let name = DeviceName::new(req.name)?;
        info!("Set name = {}", name.as_str());

        self.store.set_str(KEY_NAME, name.as_str())?;
        Ok(Ack::ok())
    }

    /// GET /api/mode/get
    pub fn get_mode(&self) -> ModeResponse {
        ModeResponse {
            mode: self.wifi.link_state().mode_code(),
        }
    }

    /// GET /api/wifi/status
    pub fn get_wifi_status(&self) -> WifiStatusResponse {
        let link = self.wifi.link_state();
        WifiStatusResponse {
            state: link.state.as_str().to_string(),
            retry_count: link.retry_count,
            ip: link.last_ip.map(|ip| ip.to_string()),
            mode: link.mode_code(),
        }
    }

    /// GET /api/wifi/scan
    ///
    /// Blocks for the duration of the radio scan; callers on an async
    /// runtime should run it on a blocking thread.
    pub fn scan(&self) -> Vec<ScanEntry> {
        self.wifi
            .scan(self.scan_limit)
            .into_iter()
            .map(|record| ScanEntry {
                ssid: record.ssid,
                rssi: record.signal_strength,
                channel: record.channel,
            })
            .collect()
    }

    /// POST /api/wifi/sta
    pub fn post_station(&self, body: &[u8]) -> Result<Ack, ApiError> {
        let req: StationRequest = decode_body(body, self.scratch_bufsize)?;
        let credentials = StationCredentials::new(req.ssid, req.password)?;

        if req.save {
            self.store.set_str(KEY_STA_SSID, credentials.ssid())?;
            self.store
                .set_str(KEY_STA_PASSWORD, credentials.password())?;
            info!("Saved station credentials for '{}'", credentials.ssid());
        }

        self.wifi.set_credentials(credentials);
        Ok(Ack::ok())
    }

    /// Apply the stored fan speed, or `config.initial_speed` if none is
    /// stored. Called once at boot.
    pub fn restore_fan_speed(&self, initial_speed: i32) -> u8 {
        let speed = match self.store.get_int(KEY_FAN_SPEED) {
            Ok(Some(speed)) => speed,
            Ok(None) => initial_speed,
            Err(e) => {
                warn!("Failed to read stored fan speed, using {}: {}", initial_speed, e);
                initial_speed
            }
        };
        let command = FanCommand::clamped(speed as i64);
        self.apply_speed(command);
        command.speed_percent()
    }

    fn apply_speed(&self, command: FanCommand) {
        let percent = command.speed_percent() as i64;
        self.fan.set_speed(percent);
        self.indicator.set_hue(indicator_hue(percent));
    }
}

/// Station credentials to use at boot: saved ones first, then the
/// configured defaults.
pub fn boot_credentials(store: &dyn KvStore, config: &DeviceConfig) -> Option<StationCredentials> {
    let saved = match (store.get_str(KEY_STA_SSID), store.get_str(KEY_STA_PASSWORD)) {
        (Ok(Some(ssid)), Ok(password)) => {
            StationCredentials::new(ssid, password.unwrap_or_default()).ok()
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to read saved station credentials: {}", e);
            None
        }
        _ => None,
    };
    saved.or_else(|| config.station_credentials())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan::{LogIndicator, VirtualChannel};
    use crate::model::{LinkState, ScanRecord};
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StubWifi {
        link: LinkState,
        credentials: Mutex<Vec<StationCredentials>>,
    }

    impl WifiControl for StubWifi {
        fn link_state(&self) -> LinkState {
            self.link.clone()
        }

        fn set_credentials(&self, credentials: StationCredentials) {
            self.credentials.lock().unwrap().push(credentials);
        }

        fn scan(&self, max_results: usize) -> Vec<ScanRecord> {
            vec![
                ScanRecord {
                    ssid: "home".into(),
                    signal_strength: -48,
                    channel: 6,
                },
                ScanRecord {
                    ssid: "neighbour".into(),
                    signal_strength: -81,
                    channel: 11,
                },
            ]
            .into_iter()
            .take(max_results)
            .collect()
        }
    }

    struct Fixture {
        api: ControlApi,
        store: Arc<MemoryStore>,
        duty: Arc<AtomicU32>,
        indicator: Arc<LogIndicator>,
        wifi: Arc<StubWifi>,
    }

    fn fixture() -> Fixture {
        let config = DeviceConfig::default();
        let store = Arc::new(MemoryStore::new());
        let channel = VirtualChannel::new(config.max_duty);
        let duty = channel.duty_handle();
        let indicator = Arc::new(LogIndicator::new());
        let wifi = Arc::new(StubWifi::default());
        let api = ControlApi::new(
            &config,
            store.clone(),
            Arc::new(FanDriver::new(channel)),
            indicator.clone(),
            Arc::new(SpeedSensor::new(Duration::from_secs(3), 1)),
            wifi.clone(),
        );
        Fixture {
            api,
            store,
            duty,
            indicator,
            wifi,
        }
    }

    #[test]
    fn test_speed_round_trip() {
        let f = fixture();
        assert_eq!(f.api.get_fan_speed().speed, 0);

        f.api.put_fan_speed(br#"{"speed":50}"#).unwrap();
        assert_eq!(f.api.get_fan_speed().speed, 50);
        assert_eq!(f.duty.load(Ordering::Relaxed), 127);
        assert_eq!(f.indicator.hue(), 120);
    }

    #[test]
    fn test_speed_is_clamped_before_storing() {
        let f = fixture();
        f.api.put_fan_speed(br#"{"speed":180}"#).unwrap();
        assert_eq!(f.store.get_int(KEY_FAN_SPEED).unwrap(), Some(100));
        assert_eq!(f.duty.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_bad_speed_body() {
        let f = fixture();
        let err = f.api.put_fan_speed(br#"{"rpm":50}"#).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(f.store.get_int(KEY_FAN_SPEED).unwrap(), None);
    }

    #[test]
    fn test_unreadable_speed_reads_zero() {
        let f = fixture();
        f.store.set_str(KEY_FAN_SPEED, "garbage").unwrap();
        assert_eq!(f.api.get_fan_speed().speed, 0);
    }

    #[test]
    fn test_name_default_and_update() {
        let f = fixture();
        assert_eq!(f.api.get_name().name, "fctl");

        f.api.put_name(br#"{"name":"bedroom"}"#).unwrap();
        assert_eq!(f.api.get_name().name, "bedroom");

        let err = f.api.put_name(br#"{"name":""}"#).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_oversized_name_is_server_error() {
        let f = fixture();
        let body = format!(r#"{{"name":"{}"}}"#, "x".repeat(20_000));
        let err = f.api.put_name(body.as_bytes()).unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(f.store.get_str(KEY_NAME).unwrap(), None);
    }

    #[test]
    fn test_station_credentials_forwarded() {
        let f = fixture();
        f.api
            .post_station(br#"{"ssid":"office","password":"secret99"}"#)
            .unwrap();

        let sent = f.wifi.credentials.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ssid(), "office");
        // Not persisted unless asked.
        assert_eq!(f.store.get_str(KEY_STA_SSID).unwrap(), None);
    }

    #[test]
    fn test_station_credentials_saved_on_request() {
        let f = fixture();
        f.api
            .post_station(br#"{"ssid":"office","password":"secret99","save":true}"#)
            .unwrap();

        assert_eq!(
            f.store.get_str(KEY_STA_SSID).unwrap().as_deref(),
            Some("office")
        );
        let creds = boot_credentials(f.store.as_ref(), &DeviceConfig::default()).unwrap();
        assert_eq!(creds.password(), "secret99");
    }

    #[test]
    fn test_station_rejects_missing_password() {
        let f = fixture();
        let err = f.api.post_station(br#"{"ssid":"office"}"#).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(f.wifi.credentials.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scan_entries() {
        let f = fixture();
        let entries = f.api.scan();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ssid, "home");
        assert_eq!(entries[0].rssi, -48);
        assert_eq!(entries[1].channel, 11);
    }

    #[test]
    fn test_restore_fan_speed() {
        let f = fixture();
        assert_eq!(f.api.restore_fan_speed(10), 10);
        assert_eq!(f.duty.load(Ordering::Relaxed), 229);

        f.store.set_int(KEY_FAN_SPEED, 80).unwrap();
        assert_eq!(f.api.restore_fan_speed(10), 80);
        assert_eq!(f.duty.load(Ordering::Relaxed), 51);
    }

    #[test]
    fn test_boot_credentials_fall_back_to_config() {
        let store = MemoryStore::new();
        let config = DeviceConfig {
            station_ssid: "lab".into(),
            station_password: "benchtop".into(),
            ..Default::default()
        };
        let creds = boot_credentials(&store, &config).unwrap();
        assert_eq!(creds.ssid(), "lab");
    }
}
