//! Integration tests for the fan controller runtime.
//!
//! These tests start the controller against a scripted radio and drive it
//! through the event channel, the way the radio driver does on a host.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use fanctl_core::store::{KEY_FAN_SPEED, KEY_STA_PASSWORD, KEY_STA_SSID};
use fanctl_core::{
    ConnectionState, DeviceConfig, FanDriver, KvStore, LinkState, LogIndicator, MemoryStore,
    Radio, RadioError, ScanRecord, SpeedSensor, StationCredentials, VirtualChannel,
};
use fanctl_server::{event_channel, spawn_sampler, EventSender, FanController, Peripherals};

/// Radio that records every call. With `echo` set it reports requested
/// disconnects back on the event channel, as the device driver does.
#[derive(Clone, Default)]
struct ScriptedRadio {
    calls: Arc<Mutex<Vec<String>>>,
    echo: Option<EventSender>,
}

impl ScriptedRadio {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl Radio for ScriptedRadio {
    fn connect(&mut self) -> Result<(), RadioError> {
        self.record("connect");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.record("disconnect");
        if let Some(events) = &self.echo {
            let _ = events.send(fanctl_core::WifiEvent::StaDisconnected);
        }
        Ok(())
    }

    fn set_station_mode(&mut self) -> Result<(), RadioError> {
        self.record("station");
        Ok(())
    }

    fn apply_credentials(&mut self, credentials: &StationCredentials) -> Result<(), RadioError> {
        self.record(format!("credentials:{}", credentials.ssid()));
        Ok(())
    }

    fn start_access_point(&mut self) -> Result<(), RadioError> {
        self.record("ap");
        Ok(())
    }

    fn scan(&mut self, _max_results: usize) -> Result<Vec<ScanRecord>, RadioError> {
        self.record("scan");
        Ok(Vec::new())
    }
}

struct TestDevice {
    controller: FanController<ScriptedRadio>,
    radio: ScriptedRadio,
    store: Arc<MemoryStore>,
    duty: Arc<std::sync::atomic::AtomicU32>,
}

fn test_device(config: DeviceConfig) -> TestDevice {
    build_device(config, false)
}

fn build_device(config: DeviceConfig, echo: bool) -> TestDevice {
    let store = Arc::new(MemoryStore::new());
    let channel = VirtualChannel::new(config.max_duty);
    let duty = channel.duty_handle();
    let (event_tx, event_rx) = event_channel();
    let radio = ScriptedRadio {
        echo: echo.then(|| event_tx.clone()),
        ..Default::default()
    };

    let peripherals = Peripherals {
        store: store.clone(),
        fan: Arc::new(FanDriver::new(channel)),
        indicator: Arc::new(LogIndicator::new()),
        sensor: Arc::new(SpeedSensor::new(config.sample_window(), 1)),
        radio: radio.clone(),
    };
    let controller = FanController::new(config, peripherals, (event_tx, event_rx));

    TestDevice {
        controller,
        radio,
        store,
        duty,
    }
}

/// Wait until the link state satisfies `pred`.
async fn wait_for_state(
    link: impl Fn() -> LinkState,
    pred: impl Fn(&LinkState) -> bool,
) -> LinkState {
    timeout(Duration::from_secs(5), async {
        loop {
            let state = link();
            if pred(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("link state not reached")
}

#[tokio::test]
async fn test_boot_restores_speed_and_connects() {
    let device = test_device(DeviceConfig::default());
    device.store.set_int(KEY_FAN_SPEED, 50).unwrap();
    device.store.set_str(KEY_STA_SSID, "workshop").unwrap();
    device.store.set_str(KEY_STA_PASSWORD, "sawdust1").unwrap();

    let manager = device.controller.manager().clone();
    let running = device.controller.start().unwrap();

    assert_eq!(device.duty.load(std::sync::atomic::Ordering::Relaxed), 127);

    let state = wait_for_state(
        || fanctl_core::WifiControl::link_state(manager.as_ref()),
        |s| s.state == ConnectionState::Connecting,
    )
    .await;
    assert_eq!(state.retry_count, 0);

    // Taking the radio lock waits for the in-flight event to finish.
    let calls = manager.with_radio(|radio| radio.calls());
    assert_eq!(calls, vec!["credentials:workshop", "connect"]);

    running.shutdown();
}

#[tokio::test]
async fn test_boot_without_stored_speed_uses_initial() {
    let device = test_device(DeviceConfig::default());
    let running = device.controller.start().unwrap();

    // initial_speed 10 -> 255 * 90 / 100
    assert_eq!(device.duty.load(std::sync::atomic::Ordering::Relaxed), 229);
    running.shutdown();
}

#[tokio::test]
async fn test_events_drive_fallback_and_recovery() {
    let device = test_device(DeviceConfig::default());
    let running = device.controller.start().unwrap();
    let events = running.event_sender();
    let api = running.api().clone();

    for _ in 0..5 {
        events.send(fanctl_core::WifiEvent::StaDisconnected).unwrap();
    }
    let state = wait_for_state(
        || fanctl_core::WifiControl::link_state(api.wifi().as_ref()),
        |s| s.state == ConnectionState::ApFallback,
    )
    .await;
    assert_eq!(state.retry_count, 5);
    assert_eq!(api.get_mode().mode, 1);

    // Provisioning through the API leaves the access point.
    api.post_station(br#"{"ssid":"office","password":"secret99"}"#)
        .unwrap();
    assert_eq!(api.get_mode().mode, 0);

    let calls = device.radio.calls();
    assert_eq!(calls.iter().filter(|c| *c == "ap").count(), 1);
    assert_eq!(
        calls[calls.len() - 3..],
        ["station", "credentials:office", "connect"]
    );
    assert_eq!(api.get_wifi_status().state, "connecting");

    events
        .send(fanctl_core::WifiEvent::GotIp(Ipv4Addr::new(192, 168, 4, 20)))
        .unwrap();
    wait_for_state(
        || fanctl_core::WifiControl::link_state(api.wifi().as_ref()),
        |s| s.state == ConnectionState::Connected,
    )
    .await;

    let status = api.get_wifi_status();
    assert_eq!(status.ip.as_deref(), Some("192.168.4.20"));
    assert_eq!(status.retry_count, 0);

    running.shutdown();
}

#[tokio::test]
async fn test_switching_networks_keeps_retry_budget() {
    let device = build_device(DeviceConfig::default(), true);
    let running = device.controller.start().unwrap();
    let events = running.event_sender();
    let api = running.api().clone();

    events
        .send(fanctl_core::WifiEvent::GotIp(Ipv4Addr::new(192, 168, 1, 7)))
        .unwrap();
    wait_for_state(
        || fanctl_core::WifiControl::link_state(api.wifi().as_ref()),
        |s| s.state == ConnectionState::Connected,
    )
    .await;

    api.post_station(br#"{"ssid":"office","password":"secret99"}"#)
        .unwrap();

    // The radio's report of the requested disconnect is not a failure.
    let state = wait_for_state(
        || fanctl_core::WifiControl::link_state(api.wifi().as_ref()),
        |s| !s.disconnect_pending,
    )
    .await;
    assert_eq!(state.state, ConnectionState::Connecting);
    assert_eq!(state.retry_count, 0);

    for _ in 0..4 {
        events.send(fanctl_core::WifiEvent::StaDisconnected).unwrap();
    }
    let state = wait_for_state(
        || fanctl_core::WifiControl::link_state(api.wifi().as_ref()),
        |s| s.retry_count == 4,
    )
    .await;
    assert_eq!(state.state, ConnectionState::Connecting);

    events.send(fanctl_core::WifiEvent::StaDisconnected).unwrap();
    wait_for_state(
        || fanctl_core::WifiControl::link_state(api.wifi().as_ref()),
        |s| s.state == ConnectionState::ApFallback,
    )
    .await;

    let calls = device.radio.calls();
    assert_eq!(calls.iter().filter(|c| *c == "disconnect").count(), 1);

    running.shutdown();
}

#[tokio::test]
async fn test_start_outside_runtime_fails() {
    let device = test_device(DeviceConfig::default());
    let result = std::thread::spawn(move || device.controller.start().is_err())
        .join()
        .unwrap();
    assert!(result);
}

#[tokio::test(start_paused = true)]
async fn test_sampler_publishes_each_window() {
    let sensor = Arc::new(SpeedSensor::new(Duration::from_secs(3), 1));
    let task = spawn_sampler(sensor.clone());

    for _ in 0..40 {
        sensor.record_pulse();
    }

    // Not yet sampled before the first window closes.
    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert_eq!(sensor.rpm(), 0);
    assert_eq!(sensor.pending_pulses(), 40);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sensor.rpm(), 800);
    assert_eq!(sensor.pending_pulses(), 0);

    // An empty window reads zero.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sensor.rpm(), 0);

    task.abort();
}
