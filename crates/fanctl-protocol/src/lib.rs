//! # fanctl-protocol
//!
//! Control API message types and request body codec.
//!
//! This crate defines the JSON request and response bodies exchanged with the
//! fan controller over HTTP. It has no runtime dependencies so that both the
//! Linux (axum) and ESP32 (esp-idf-svc) servers share the same wire format.

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
