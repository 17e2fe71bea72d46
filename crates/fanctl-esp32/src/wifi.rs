//! Wi-Fi radio driver for ESP32.
//!
//! `EspRadio` implements the core `Radio` trait on top of `EspWifi`. The
//! driver's asynchronous notifications arrive on the system event loop;
//! [`subscribe_events`] translates them into core `WifiEvent`s and queues
//! them for a dedicated thread ([`spawn_event_pump`]) that feeds the
//! connectivity manager, so event loop callbacks never block on the radio.

use std::net::Ipv4Addr;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{EspWifi, WifiEvent as EspWifiEvent};
use log::{debug, info, warn};

use fanctl_core::{
    ConnectivityManager, DeviceConfig, Radio, RadioError, ScanRecord, StationCredentials,
    WifiEvent,
};

/// Stack size of the event pump thread.
const EVENT_PUMP_STACK_SIZE: usize = 8 * 1024;

fn driver_err(e: impl std::fmt::Display) -> RadioError {
    RadioError::Driver(e.to_string())
}

fn auth_method_for(password: &str) -> AuthMethod {
    if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    }
}

/// The ESP32 radio.
pub struct EspRadio {
    wifi: EspWifi<'static>,
    station: ClientConfiguration,
    access_point: AccessPointConfiguration,
}

impl EspRadio {
    pub fn new(
        modem: impl Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: &DeviceConfig,
    ) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sysloop, Some(nvs))?;

        let access_point = AccessPointConfiguration {
            ssid: config
                .ap_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("access point SSID too long"))?,
            password: config
                .ap_password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("access point password too long"))?,
            auth_method: auth_method_for(&config.ap_password),
            max_connections: 4,
            ..Default::default()
        };

        Ok(Self {
            wifi,
            station: ClientConfiguration::default(),
            access_point,
        })
    }

    /// Start the station interface. The driver answers with `StaStarted`.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.wifi
            .set_configuration(&Configuration::Client(self.station.clone()))?;
        self.wifi.start()?;
        info!("Wi-Fi station started");
        Ok(())
    }
}

impl Radio for EspRadio {
    fn connect(&mut self) -> Result<(), RadioError> {
        self.wifi.connect().map_err(driver_err)
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.wifi.disconnect().map_err(driver_err)
    }

    fn set_station_mode(&mut self) -> Result<(), RadioError> {
        self.wifi.stop().map_err(driver_err)?;
        self.wifi
            .set_configuration(&Configuration::Client(self.station.clone()))
            .map_err(driver_err)?;
        self.wifi.start().map_err(driver_err)?;
        info!("Access point stopped, station mode");
        Ok(())
    }

    fn apply_credentials(&mut self, credentials: &StationCredentials) -> Result<(), RadioError> {
        self.station = ClientConfiguration {
            ssid: credentials
                .ssid()
                .try_into()
                .map_err(|_| RadioError::Driver("SSID too long".into()))?,
            password: credentials
                .password()
                .try_into()
                .map_err(|_| RadioError::Driver("password too long".into()))?,
            auth_method: auth_method_for(credentials.password()),
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(self.station.clone()))
            .map_err(driver_err)
    }

    fn start_access_point(&mut self) -> Result<(), RadioError> {
        self.wifi.stop().map_err(driver_err)?;
        self.wifi
            .set_configuration(&Configuration::AccessPoint(self.access_point.clone()))
            .map_err(driver_err)?;
        self.wifi.start().map_err(driver_err)?;
        info!(
            "Access point '{}' started",
            self.access_point.ssid.as_str()
        );
        Ok(())
    }

    fn scan(&mut self, max_results: usize) -> Result<Vec<ScanRecord>, RadioError> {
        let found = self
            .wifi
            .scan()
            .map_err(|e| RadioError::Scan(e.to_string()))?;

        Ok(found
            .into_iter()
            .take(max_results)
            .map(|ap| ScanRecord {
                ssid: ap.ssid.as_str().to_string(),
                signal_strength: ap.signal_strength,
                channel: ap.channel,
            })
            .collect())
    }
}

/// Event loop subscriptions; events stop flowing when dropped.
pub struct WifiSubscriptions {
    _wifi: EspSubscription<'static, System>,
    _ip: EspSubscription<'static, System>,
}

/// Forward driver and network stack events to `events`.
pub fn subscribe_events(
    sysloop: &EspSystemEventLoop,
    events: Sender<WifiEvent>,
) -> anyhow::Result<WifiSubscriptions> {
    let wifi = {
        let events = events.clone();
        sysloop.subscribe::<EspWifiEvent, _>(move |event| {
            let event = match event {
                EspWifiEvent::StaStarted => WifiEvent::StaStart,
                EspWifiEvent::StaStopped => WifiEvent::StaStop,
                EspWifiEvent::StaDisconnected { .. } => WifiEvent::StaDisconnected,
                EspWifiEvent::ApStaConnected(info) => WifiEvent::ApClientJoined {
                    mac: info.mac(),
                    aid: info.aid(),
                },
                EspWifiEvent::ApStaDisconnected(info) => WifiEvent::ApClientLeft {
                    mac: info.mac(),
                    aid: info.aid(),
                },
                other => {
                    debug!("Ignoring Wi-Fi event {:?}", other);
                    return;
                }
            };
            let _ = events.send(event);
        })?
    };

    let ip = sysloop.subscribe::<IpEvent, _>(move |event| {
        if let IpEvent::DhcpIpAssigned(assignment) = event {
            let ip = Ipv4Addr::from(assignment.ip().octets());
            let _ = events.send(WifiEvent::GotIp(ip));
        }
    })?;

    Ok(WifiSubscriptions {
        _wifi: wifi,
        _ip: ip,
    })
}

/// Run the connectivity manager on its own thread, one event at a time.
pub fn spawn_event_pump(
    manager: Arc<ConnectivityManager<EspRadio>>,
    events: Receiver<WifiEvent>,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("wifi-events".into())
        .stack_size(EVENT_PUMP_STACK_SIZE)
        .spawn(move || {
            for event in events {
                manager.handle_event(event);
            }
            warn!("Wi-Fi event channel closed");
        })?;
    Ok(handle)
}
