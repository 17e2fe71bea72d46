//! # fanctl-server
//!
//! Runtime wiring for the fan controller on hosts with a tokio runtime.
//!
//! The core crate is synchronous; this crate drives it:
//! - an event pump feeding network events from an `mpsc` channel into the
//!   connectivity manager, one at a time
//! - a sampling task closing the speed sensor window on a fixed interval
//! - the boot sequence (restore fan speed, load station credentials)
//!
//! Enable features based on target platform:
//! - `tokio-runtime` (default) - For Linux/desktop

#[cfg(feature = "tokio-runtime")]
pub mod server;

#[cfg(feature = "tokio-runtime")]
pub use server::{
    event_channel, spawn_event_pump, spawn_sampler, EventReceiver, EventSender, FanController,
    Peripherals, RunningController, ServerError,
};

pub use fanctl_core::{ControlApi, DeviceConfig, LinkState, WifiEvent};
