//! Fan controller runtime.
//!
//! This module owns the background activities of the device:
//! - Wi-Fi event pump (radio events → connectivity manager)
//! - Speed sensor sampling timer
//! - Boot sequence
//!
//! API requests are handled elsewhere (see `fanctl-web`) through the
//! [`ControlApi`] returned by [`FanController::api`].

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use fanctl_core::{
    boot_credentials, ConnectivityManager, ControlApi, DeviceConfig, FanDriver, Indicator,
    KvStore, Radio, SpeedSensor, WifiControl, WifiEvent,
};

/// Sender half of the Wi-Fi event channel, handed to the radio driver.
pub type EventSender = mpsc::UnboundedSender<WifiEvent>;

/// Receiver half of the Wi-Fi event channel, consumed by the event pump.
pub type EventReceiver = mpsc::UnboundedReceiver<WifiEvent>;

/// Create the channel network events travel on.
///
/// The channel is unbounded so radio callbacks never block.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Errors that can occur while starting the controller.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// Hardware (or simulated hardware) the controller drives.
pub struct Peripherals<R: Radio> {
    pub store: Arc<dyn KvStore>,
    pub fan: Arc<FanDriver>,
    pub indicator: Arc<dyn Indicator>,
    pub sensor: Arc<SpeedSensor>,
    pub radio: R,
}

/// A configured controller that has not started its background tasks yet.
pub struct FanController<R: Radio + 'static> {
    config: DeviceConfig,
    api: ControlApi,
    manager: Arc<ConnectivityManager<R>>,
    event_tx: EventSender,
    event_rx: EventReceiver,
}

impl<R: Radio + 'static> FanController<R> {
    /// Assemble the controller.
    ///
    /// `events` must be the channel whose sender the radio reports its
    /// events on.
    pub fn new(
        config: DeviceConfig,
        peripherals: Peripherals<R>,
        events: (EventSender, EventReceiver),
    ) -> Self {
        let (event_tx, event_rx) = events;
        let manager = Arc::new(ConnectivityManager::new(
            peripherals.radio,
            config.max_retry,
        ));
        let wifi: Arc<dyn WifiControl> = manager.clone();
        let api = ControlApi::new(
            &config,
            peripherals.store,
            peripherals.fan,
            peripherals.indicator,
            peripherals.sensor,
            wifi,
        );

        Self {
            config,
            api,
            manager,
            event_tx,
            event_rx,
        }
    }

    pub fn api(&self) -> &ControlApi {
        &self.api
    }

    pub fn manager(&self) -> &Arc<ConnectivityManager<R>> {
        &self.manager
    }

    pub fn event_sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    /// Run the boot sequence and spawn the background tasks.
    ///
    /// Boot order: restore the persisted fan speed, hand the station
    /// credentials to the radio, then start the station interface.
    pub fn start(self) -> Result<RunningController, ServerError> {
        Handle::try_current()?;

        let speed = self.api.restore_fan_speed(self.config.initial_speed);
        info!("Restored fan speed {}%", speed);

        match boot_credentials(self.api.store().as_ref(), &self.config) {
            Some(credentials) => {
                info!("Station network: '{}'", credentials.ssid());
                self.manager.with_radio(|radio| {
                    if let Err(e) = radio.apply_credentials(&credentials) {
                        error!("Failed to apply station credentials: {}", e);
                    }
                });
            }
            None => warn!("No station credentials configured"),
        }

        let pump = spawn_event_pump(self.manager.clone(), self.event_rx);
        let sampler = spawn_sampler(self.api.sensor().clone());

        // The receiver is owned by the pump, so this cannot fail.
        let _ = self.event_tx.send(WifiEvent::StaStart);

        Ok(RunningController {
            api: self.api,
            event_tx: self.event_tx,
            tasks: vec![pump, sampler],
        })
    }
}

/// Handle to a controller with running background tasks.
pub struct RunningController {
    api: ControlApi,
    event_tx: EventSender,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningController {
    pub fn api(&self) -> &ControlApi {
        &self.api
    }

    pub fn event_sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    /// Stop the background tasks.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Fan controller stopped");
    }
}

/// Spawn the task feeding network events to the manager.
///
/// Events are handled strictly in arrival order. Each is run on the blocking
/// pool since the radio calls it triggers are synchronous.
pub fn spawn_event_pump<R: Radio + 'static>(
    manager: Arc<ConnectivityManager<R>>,
    mut events: EventReceiver,
) -> JoinHandle<()> {
    let max_retry = manager.max_retry();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let manager = manager.clone();
            match tokio::task::spawn_blocking(move || manager.handle_event(event)).await {
                Ok(state) => debug!(
                    "Wi-Fi state {} (retry {}/{})",
                    state.state, state.retry_count, max_retry
                ),
                Err(e) => error!("Wi-Fi event handler failed: {}", e),
            }
        }
        debug!("Wi-Fi event channel closed");
    })
}

/// Spawn the task closing the sensor window every `sensor.window()`.
///
/// The first sample is taken one full window after spawning.
pub fn spawn_sampler(sensor: Arc<SpeedSensor>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let window = sensor.window();
        let mut ticker = interval_at(Instant::now() + window, window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let sample = sensor.sample();
            debug!(
                "Speed window closed: {} pulses, {} rpm",
                sample.pulse_count,
                sensor.rpm()
            );
        }
    })
}
