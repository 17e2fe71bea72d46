//! ESP32-specific components for the fan controller.
//!
//! This crate implements the hardware seams of `fanctl-core` on ESP-IDF:
//! - `nvs`: the persistent store on NVS flash
//! - `wifi`: the radio driver and system event loop subscription
//! - `fan`: the LEDC PWM channel driving the fan
//! - `rpm`: the tachometer interrupt and the sampling timer
//! - `http`: Control API and static file handlers on `EspHttpServer`
//!
//! # Architecture
//!
//! All device logic (state machine, duty mapping, request handling) lives in
//! `fanctl-core` and is shared with the Linux build; this crate only moves
//! bytes and events between ESP-IDF and the core types.
//!
//! # Example
//!
//! ```ignore
//! use fanctl_esp32::nvs::NvsStore;
//! use fanctl_esp32::wifi::EspRadio;
//!
//! let store = NvsStore::new(nvs_partition.clone(), "storage")?;
//! let radio = EspRadio::new(peripherals.modem, sysloop.clone(), nvs_partition, &config)?;
//! ```

pub mod fan;
pub mod http;
pub mod nvs;
pub mod rpm;
pub mod wifi;
