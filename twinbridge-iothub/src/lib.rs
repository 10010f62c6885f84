//! Bridge from pub/sub telemetry envelopes to Azure IoT Hub.
//!
//! A subscribe-side transport (MQTT or Zenoh) delivers JSON envelopes of the
//! form
//!
//! ```text
//! { "timestamp": <epoch>, "hardwareId": "<id>", "readings": { "<tag>": <number>, ... } }
//! ```
//!
//! Only the most recent envelope is kept. On a fixed interval it is expanded
//! into one measurement per reading:
//!
//! ```text
//! { "timestamp": <epoch>, "tagName": "<tag>", "value": <number>,
//!   "deviceName": "<configured>", "deviceID": "<hardwareId>" }
//! ```
//!
//! and every measurement is sent to the hub as its own device-to-cloud
//! message. Sends are fire-and-forget; a tick never waits on delivery.

pub mod buffer;
pub mod config;
pub mod forwarder;
pub mod iothub;
pub mod listener;
pub mod normalizer;
pub mod source;
pub mod ticker;

pub use buffer::LatestEnvelope;
pub use forwarder::{CloudClient, DeliveryError, Forwarder, Pending};
pub use listener::{IngestionListener, TransportListener};
pub use normalizer::{Normalized, Normalizer, ParseError};
pub use ticker::{DispatchTicker, TickOutcome};
