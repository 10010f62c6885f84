//! Azure IoT Hub device-to-cloud messaging.
//!
//! Authentication uses a device (or module) connection string with a shared
//! access key. Each connection presents a SAS token signed from that key;
//! tokens are renewed whenever the session has to reconnect close to expiry.

mod ack;
mod client;
mod connection_string;
mod sas;

pub use client::{API_VERSION, IotHubClient, IotHubConnection};
pub use connection_string::{ConnectionStringError, DeviceConnectionString};
pub use sas::SasToken;
