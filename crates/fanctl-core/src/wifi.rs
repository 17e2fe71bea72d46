//! Connectivity manager.
//!
//! Keeps the station attached to the configured network and falls back to
//! broadcasting the device's own access point when attachment keeps failing.
//!
//! The state machine is a pure function, [`transition`], mapping the current
//! [`LinkState`] and an incoming [`WifiEvent`] to the next state and a list of
//! [`Effect`]s. [`ConnectivityManager`] serializes events through it and runs
//! the effects on a [`Radio`].
//!
//! ```text
//!   Disconnected --StaStart--> Connecting --GotIp--> Connected
//!                                 |   ^                  |
//!                  StaDisconnected|   |retry  StaDisconnected (fresh budget)
//!                                 v   |                  |
//!                        retries < max              Connecting
//!                                 |
//!                        retries == max --> ApFallback
//! ```
//!
//! `SetCredentials` re-enters `Connecting` from every state with a fresh
//! retry budget. The radio reports the disconnect and the station restart
//! that switch causes like any other; those reports are recognised through
//! the pending flags on [`LinkState`] and do not count as failures.

use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{ConnectionState, LinkState, RadioMode, ScanRecord, StationCredentials};

/// Consecutive failed attempts before falling back to access-point mode.
pub const MAX_RETRY: u32 = 5;

/// Maximum number of records returned by a scan.
pub const SCAN_LIST_SIZE: usize = 10;

/// Input to the state machine: radio/network stack events plus commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// Station interface started.
    StaStart,
    /// Station interface stopped.
    StaStop,
    /// Network stack acquired an address.
    GotIp(Ipv4Addr),
    /// Station lost or failed to establish the association.
    StaDisconnected,
    /// A client joined the device's access point.
    ApClientJoined { mac: [u8; 6], aid: u16 },
    /// A client left the device's access point.
    ApClientLeft { mac: [u8; 6], aid: u16 },
    /// Replace the station credentials and reconnect.
    SetCredentials(StationCredentials),
}

/// Radio operation requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Connect,
    Disconnect,
    /// Leave access-point mode and restart the station interface.
    EnterStationMode,
    ApplyCredentials(StationCredentials),
    /// Switch to access-point mode with the fixed local SSID.
    StartAccessPoint,
}

/// Compute the next state and the radio effects for `event`.
///
/// `max_retry` is the number of consecutive failed attempts that triggers
/// the access-point fallback; the fallback happens on that failure itself.
pub fn transition(
    current: &LinkState,
    event: &WifiEvent,
    max_retry: u32,
) -> (LinkState, Vec<Effect>) {
    let mut next = current.clone();
    let mut effects = Vec::new();

    match event {
        WifiEvent::StaStart => {
            next.restart_pending = false;
            if current.state == ConnectionState::Disconnected {
                next.state = ConnectionState::Connecting;
                effects.push(Effect::Connect);
            }
        }

        WifiEvent::StaStop => {
            if !current.restart_pending && current.state != ConnectionState::ApFallback {
                next.state = ConnectionState::Disconnected;
            }
        }

        WifiEvent::GotIp(ip) => {
            next.state = ConnectionState::Connected;
            next.retry_count = 0;
            next.last_ip = Some(*ip);
            next.mode = RadioMode::Station;
            next.disconnect_pending = false;
            next.restart_pending = false;
        }

        WifiEvent::StaDisconnected if current.disconnect_pending => {
            next.disconnect_pending = false;
        }

        WifiEvent::StaDisconnected => match current.state {
            ConnectionState::Connected => {
                next.state = ConnectionState::Connecting;
                next.retry_count = 0;
                effects.push(Effect::Connect);
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                next.retry_count = current.retry_count.saturating_add(1);
                if next.retry_count >= max_retry {
                    next.state = ConnectionState::ApFallback;
                    next.mode = RadioMode::AccessPoint;
                    effects.push(Effect::StartAccessPoint);
                } else {
                    next.state = ConnectionState::Connecting;
                    effects.push(Effect::Connect);
                }
            }
            ConnectionState::ApFallback => {}
        },

        WifiEvent::ApClientJoined { .. } | WifiEvent::ApClientLeft { .. } => {}

        WifiEvent::SetCredentials(credentials) => {
            if current.mode == RadioMode::AccessPoint {
                effects.push(Effect::EnterStationMode);
                next.restart_pending = true;
            }
            if current.state == ConnectionState::Connected {
                effects.push(Effect::Disconnect);
                next.disconnect_pending = true;
            }
            effects.push(Effect::ApplyCredentials(credentials.clone()));
            effects.push(Effect::Connect);

            next.state = ConnectionState::Connecting;
            next.retry_count = 0;
            next.mode = RadioMode::Station;
        }
    }

    (next, effects)
}

/// Radio driver failure.
#[derive(Debug, Clone, Error)]
pub enum RadioError {
    #[error("radio driver error: {0}")]
    Driver(String),

    #[error("scan failed: {0}")]
    Scan(String),
}

/// Radio primitives the manager drives.
///
/// Implementations forward the radio's asynchronous events back to
/// [`ConnectivityManager::handle_event`].
pub trait Radio: Send {
    fn connect(&mut self) -> Result<(), RadioError>;

    fn disconnect(&mut self) -> Result<(), RadioError>;

    /// Leave access-point mode and restart the station interface.
    fn set_station_mode(&mut self) -> Result<(), RadioError>;

    fn apply_credentials(&mut self, credentials: &StationCredentials) -> Result<(), RadioError>;

    /// Broadcast the device's own network.
    fn start_access_point(&mut self) -> Result<(), RadioError>;

    /// Blocking scan, records in discovery order.
    fn scan(&mut self, max_results: usize) -> Result<Vec<ScanRecord>, RadioError>;
}

/// Connectivity operations used by the Control API.
pub trait WifiControl: Send + Sync {
    /// Latest state snapshot.
    fn link_state(&self) -> LinkState;

    /// Replace the station credentials and reconnect.
    fn set_credentials(&self, credentials: StationCredentials);

    /// Blocking scan. Failures yield an empty list.
    fn scan(&self, max_results: usize) -> Vec<ScanRecord>;
}

/// Owns the link state and the radio.
///
/// Event handling is serialized by the radio lock; readers only touch the
/// snapshot lock, which is never held across a radio call.
pub struct ConnectivityManager<R: Radio> {
    radio: Mutex<R>,
    snapshot: RwLock<LinkState>,
    max_retry: u32,
}

impl<R: Radio> ConnectivityManager<R> {
    pub fn new(radio: R, max_retry: u32) -> Self {
        Self {
            radio: Mutex::new(radio),
            snapshot: RwLock::new(LinkState::default()),
            max_retry: max_retry.max(1),
        }
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Feed one event through the state machine and run its effects.
    ///
    /// Effect failures are logged; the state machine recovers through the
    /// radio's follow-up events.
    pub fn handle_event(&self, event: WifiEvent) -> LinkState {
        let mut radio = self.radio.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.link_state();
        let (next, effects) = transition(&current, &event, self.max_retry);
        log_event(&current, &next, &event, self.max_retry);

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next.clone();

        for effect in &effects {
            if let Err(e) = apply_effect(&mut *radio, effect) {
                warn!("Wi-Fi {:?} failed: {}", effect, e);
            }
        }

        next
    }

    /// Run a closure with exclusive access to the radio.
    pub fn with_radio<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut radio = self.radio.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut radio)
    }
}

impl<R: Radio> WifiControl for ConnectivityManager<R> {
    fn link_state(&self) -> LinkState {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_credentials(&self, credentials: StationCredentials) {
        self.handle_event(WifiEvent::SetCredentials(credentials));
    }

    fn scan(&self, max_results: usize) -> Vec<ScanRecord> {
        let mut radio = self.radio.lock().unwrap_or_else(PoisonError::into_inner);
        match radio.scan(max_results) {
            Ok(mut records) => {
                records.truncate(max_results);
                info!("Wi-Fi scan found {} networks", records.len());
                records
            }
            Err(e) => {
                error!("Wi-Fi scan failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn apply_effect<R: Radio + ?Sized>(radio: &mut R, effect: &Effect) -> Result<(), RadioError> {
    match effect {
        Effect::Connect => radio.connect(),
        Effect::Disconnect => radio.disconnect(),
        Effect::EnterStationMode => radio.set_station_mode(),
        Effect::ApplyCredentials(credentials) => radio.apply_credentials(credentials),
        Effect::StartAccessPoint => radio.start_access_point(),
    }
}

fn log_event(current: &LinkState, next: &LinkState, event: &WifiEvent, max_retry: u32) {
    match event {
        WifiEvent::GotIp(ip) => info!("Wi-Fi connected, got ip: {}", ip),
        WifiEvent::StaDisconnected if current.disconnect_pending => {
            debug!("Wi-Fi disconnected on request")
        }
        WifiEvent::StaStop | WifiEvent::StaStart if current.restart_pending => {
            debug!("Wi-Fi station restart: {:?}", event)
        }
        WifiEvent::StaDisconnected => match next.state {
            ConnectionState::Connecting => info!(
                "Wi-Fi disconnected, retrying ({}/{})",
                next.retry_count, max_retry
            ),
            ConnectionState::ApFallback if current.state != ConnectionState::ApFallback => warn!(
                "Wi-Fi connect failed {} times, falling back to access point",
                next.retry_count
            ),
            _ => debug!("Wi-Fi disconnect ignored in state {}", current.state),
        },
        WifiEvent::ApClientJoined { mac, aid } => {
            info!("Station {} joined, AID={}", format_mac(mac), aid)
        }
        WifiEvent::ApClientLeft { mac, aid } => {
            info!("Station {} left, AID={}", format_mac(mac), aid)
        }
        WifiEvent::SetCredentials(credentials) => {
            info!("Wi-Fi credentials updated, connecting to '{}'", credentials.ssid())
        }
        _ if current.state != next.state => {
            debug!("Wi-Fi {} -> {} on {:?}", current.state, next.state, event)
        }
        _ => {}
    }
}

/// Format a MAC address as `aa:bb:cc:dd:ee:ff`.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
