//! # fanctl-core
//!
//! Core fan controller implementation.
//!
//! This crate provides:
//! - Data model types (link state, credentials, scan records, fan command)
//! - The persistent key-value store abstraction with memory and file stores
//! - The actuator driver (percent → inverted PWM duty)
//! - The pulse-counting speed sensor
//! - The connectivity state machine and its manager
//! - Framework-agnostic Control API handler logic and static asset resolution
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod api;
pub mod assets;
pub mod config;
pub mod fan;
pub mod model;
pub mod rpm;
pub mod store;
pub mod wifi;

pub use api::{boot_credentials, ApiError, ControlApi};
pub use config::{ConfigError, DeviceConfig};
pub use fan::{ChannelError, DutyChannel, FanDriver, Indicator, LogIndicator, VirtualChannel};
pub use model::*;
pub use rpm::SpeedSensor;
pub use store::{FileStore, KvStore, MemoryStore, StoreError};
pub use wifi::{ConnectivityManager, Effect, Radio, RadioError, WifiControl, WifiEvent};
