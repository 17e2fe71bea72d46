//! Simulated hardware for running the controller on a host.
//!
//! - `SimulatedRadio`: a radio with a fixed set of nearby networks. Connect
//!   attempts succeed when the applied credentials match one of them and
//!   report back through the event channel after a short delay, like the
//!   real driver does. Requested disconnects and station restarts are
//!   reported too.
//! - `spawn_tachometer`: pulses the speed sensor at a rate following the
//!   duty applied to the virtual PWM channel.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use fanctl_core::{
    DeviceConfig, Radio, RadioError, ScanRecord, SpeedSensor, StationCredentials, WifiEvent,
};
use fanctl_server::EventSender;

/// Time the simulated driver takes to associate or give up.
const CONNECT_LATENCY: Duration = Duration::from_millis(800);

/// Time a simulated scan blocks for.
const SCAN_DURATION: Duration = Duration::from_millis(1500);

/// Fan speed at zero duty (the input is active-low).
const FULL_SPEED_RPM: f64 = 2400.0;

/// A network within range of the simulated radio.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    /// Empty for an open network.
    pub password: String,
    pub rssi: i8,
    pub channel: u8,
}

impl SimNetwork {
    fn new(ssid: &str, password: &str, rssi: i8, channel: u8) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
            rssi,
            channel,
        }
    }

    fn accepts(&self, credentials: &StationCredentials) -> bool {
        self.ssid == credentials.ssid() && self.password == credentials.password()
    }
}

/// Networks around the simulated device: the configured station network
/// (if any) plus a few neighbours.
pub fn neighbourhood(config: &DeviceConfig) -> Vec<SimNetwork> {
    let mut networks = vec![
        SimNetwork::new("neighbour-2g", "correct-horse", -71, 6),
        SimNetwork::new("cafe-guest", "", -83, 11),
        SimNetwork::new("printer-direct", "hp-setup-1234", -58, 1),
    ];
    if !config.station_ssid.is_empty() {
        networks.push(SimNetwork::new(
            &config.station_ssid,
            &config.station_password,
            -47,
            6,
        ));
    }
    networks
}

pub struct SimulatedRadio {
    events: EventSender,
    runtime: Handle,
    networks: Vec<SimNetwork>,
    credentials: Option<StationCredentials>,
    next_host: u8,
}

impl SimulatedRadio {
    /// Must be created inside the tokio runtime.
    pub fn new(events: EventSender, networks: Vec<SimNetwork>) -> anyhow::Result<Self> {
        Ok(Self {
            events,
            runtime: Handle::try_current()?,
            networks,
            credentials: None,
            next_host: 100,
        })
    }

    fn emit(&self, event: WifiEvent) {
        debug!("Simulated radio event: {:?}", event);
        let _ = self.events.send(event);
    }

    fn emit_later(&self, event: WifiEvent) {
        let events = self.events.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(CONNECT_LATENCY).await;
            debug!("Simulated radio event: {:?}", event);
            let _ = events.send(event);
        });
    }
}

impl Radio for SimulatedRadio {
    fn connect(&mut self) -> Result<(), RadioError> {
        let reachable = self
            .credentials
            .as_ref()
            .map(|c| self.networks.iter().any(|n| n.accepts(c)))
            .unwrap_or(false);

        if reachable {
            let ip = Ipv4Addr::new(192, 168, 1, self.next_host);
            self.next_host = self.next_host.wrapping_add(1).max(2);
            self.emit_later(WifiEvent::GotIp(ip));
        } else {
            self.emit_later(WifiEvent::StaDisconnected);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        debug!("Simulated radio: disconnect");
        self.emit(WifiEvent::StaDisconnected);
        Ok(())
    }

    fn set_station_mode(&mut self) -> Result<(), RadioError> {
        info!("Simulated radio: station mode");
        self.emit(WifiEvent::StaStop);
        self.emit(WifiEvent::StaStart);
        Ok(())
    }

    fn apply_credentials(&mut self, credentials: &StationCredentials) -> Result<(), RadioError> {
        self.credentials = Some(credentials.clone());
        Ok(())
    }

    fn start_access_point(&mut self) -> Result<(), RadioError> {
        info!("Simulated radio: access point up");
        Ok(())
    }

    fn scan(&mut self, max_results: usize) -> Result<Vec<ScanRecord>, RadioError> {
        std::thread::sleep(SCAN_DURATION);

        let mut records: Vec<ScanRecord> = self
            .networks
            .iter()
            .map(|n| ScanRecord {
                ssid: n.ssid.clone(),
                signal_strength: n.rssi,
                channel: n.channel,
            })
            .collect();
        records.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        records.truncate(max_results);
        Ok(records)
    }
}

/// Pulse `sensor` at the rate a fan driven with the duty in `duty` would
/// produce.
pub fn spawn_tachometer(
    sensor: Arc<SpeedSensor>,
    duty: Arc<AtomicU32>,
    max_duty: u32,
) -> JoinHandle<()> {
    const TICK: Duration = Duration::from_millis(20);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK);
        let mut owed = 0.0f64;

        loop {
            ticker.tick().await;
            let duty = duty.load(Ordering::Relaxed).min(max_duty);
            let speed = 1.0 - duty as f64 / max_duty.max(1) as f64;
            let pulses_per_sec =
                FULL_SPEED_RPM * speed * sensor.pulses_per_revolution() as f64 / 60.0;

            owed += pulses_per_sec * TICK.as_secs_f64();
            while owed >= 1.0 {
                sensor.record_pulse();
                owed -= 1.0;
            }
        }
    })
}
