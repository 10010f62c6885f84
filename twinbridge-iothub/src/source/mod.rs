//! Subscribe-side transports feeding a [`TransportListener`].
//!
//! [`TransportListener`]: crate::listener::TransportListener

pub mod mqtt;
pub mod zenoh;

pub use mqtt::{BrokerAddress, MqttSource};
pub use zenoh::ZenohSource;
