//! Fan controller firmware for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.
//!
//! Wiring: fan PWM input on GPIO18, tachometer output on GPIO26. The web UI
//! is served from `/www`, which must be mounted before the HTTP server
//! starts.

use std::net::SocketAddr;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::timer::EspTaskTimerService;
use log::{error, info, warn};

use fanctl_core::{
    boot_credentials, ConnectivityManager, ControlApi, DeviceConfig, FanDriver, LogIndicator,
    Radio, SpeedSensor, WifiControl,
};
use fanctl_esp32::fan::LedcChannel;
use fanctl_esp32::http::start_http_server;
use fanctl_esp32::nvs::{NvsStore, NVS_NAMESPACE};
use fanctl_esp32::rpm::{start_sampler, PulseInterrupt};
use fanctl_esp32::wifi::{spawn_event_pump, subscribe_events, EspRadio};

fn device_config() -> DeviceConfig {
    DeviceConfig {
        http_addr: "0.0.0.0:80".to_string(),
        web_root: "/www".into(),
        station_ssid: option_env!("FANCTL_WIFI_SSID").unwrap_or("").to_string(),
        station_password: option_env!("FANCTL_WIFI_PASS").unwrap_or("").to_string(),
        ..Default::default()
    }
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    info!("Fan controller starting...");

    let config = device_config();
    config.validate()?;
    let port = config
        .http_addr
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid http address {}", config.http_addr))?
        .port();

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let timers = EspTaskTimerService::new()?;

    let store = Arc::new(NvsStore::new(nvs_partition.clone(), NVS_NAMESPACE)?);

    // Fan output and tachometer
    let channel = LedcChannel::new(
        peripherals.ledc.timer0,
        peripherals.ledc.channel0,
        peripherals.pins.gpio18,
        config.pwm_frequency_hz,
    )?;
    let sensor = Arc::new(SpeedSensor::new(
        config.sample_window(),
        config.pulses_per_revolution,
    ));
    let _tachometer = PulseInterrupt::attach(peripherals.pins.gpio26, sensor.clone())?;
    let _sampler = start_sampler(&timers, sensor.clone())?;

    // Wi-Fi
    let radio = EspRadio::new(peripherals.modem, sysloop.clone(), nvs_partition, &config)?;
    let manager = Arc::new(ConnectivityManager::new(radio, config.max_retry));
    let (event_tx, event_rx) = mpsc::channel();
    let _subscriptions = subscribe_events(&sysloop, event_tx)?;
    let _pump = spawn_event_pump(manager.clone(), event_rx)?;

    let wifi: Arc<dyn WifiControl> = manager.clone();
    let api = ControlApi::new(
        &config,
        store.clone(),
        Arc::new(FanDriver::new(channel)),
        // No LED driver yet: the speed hue (240 * speed / 100) is only logged.
        // Replace with an RMT or LEDC `Indicator` once the LED pin is wired.
        Arc::new(LogIndicator::new()),
        sensor,
        wifi,
    );

    // Boot sequence
    let speed = api.restore_fan_speed(config.initial_speed);
    info!("Restored fan speed {}%", speed);

    match boot_credentials(store.as_ref(), &config) {
        Some(credentials) => {
            info!("Station network: '{}'", credentials.ssid());
            manager.with_radio(|radio| {
                if let Err(e) = radio.apply_credentials(&credentials) {
                    error!("Failed to apply station credentials: {}", e);
                }
            });
        }
        None => warn!("No station credentials configured"),
    }
    manager.with_radio(|radio| radio.start())?;

    let _server = start_http_server(api, config.web_root.clone(), port)?;

    info!("Fan controller ready");

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
