//! MQTT broker subscription.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MqttSourceConfig;
use crate::listener::TransportListener;

const DEFAULT_PLAIN_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerAddressError {
    #[error("Broker URL is empty")]
    Empty,
    #[error("Unsupported broker URL scheme '{0}' (expected mqtt, tcp, mqtts or ssl)")]
    UnsupportedScheme(String),
    #[error("Invalid port in broker URL: {0}")]
    InvalidPort(String),
    #[error("Invalid broker URL format: {0}")]
    Malformed(String),
}

/// Host, port and transport security resolved from a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    /// Parse `mqtt://host:port`, `tcp://`, `mqtts://`, `ssl://` or bare `host[:port]`.
    pub fn parse(url: &str) -> Result<Self, BrokerAddressError> {
        let url = url.trim();
        let (tls, rest) = match url.split_once("://") {
            Some(("mqtt" | "tcp", rest)) => (false, rest),
            Some(("mqtts" | "ssl", rest)) => (true, rest),
            Some((scheme, _)) => {
                return Err(BrokerAddressError::UnsupportedScheme(scheme.to_string()));
            }
            None => (false, url),
        };
        let rest = rest.trim_end_matches('/');

        let parts: Vec<&str> = rest.split(':').collect();
        let (host, port) = match parts.as_slice() {
            [host] => (*host, if tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT }),
            [host, port] => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| BrokerAddressError::InvalidPort(port.to_string()))?;
                (*host, port)
            }
            _ => return Err(BrokerAddressError::Malformed(url.to_string())),
        };

        if host.is_empty() {
            return Err(BrokerAddressError::Empty);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "mqtts" } else { "mqtt" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Subscribes to one topic filter and feeds every publish to a listener.
pub struct MqttSource {
    config: MqttSourceConfig,
    listener: Arc<dyn TransportListener>,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig, listener: Arc<dyn TransportListener>) -> Self {
        Self { config, listener }
    }

    fn options(&self, address: &BrokerAddress) -> MqttOptions {
        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("twinbridge-{}", uuid::Uuid::new_v4()));

        let mut options = MqttOptions::new(client_id, address.host.clone(), address.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options.set_clean_session(true);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        if address.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    /// Drive the subscription until the task is aborted.
    ///
    /// The subscription is renewed on every (re)connect.
    pub async fn run(self) -> Result<(), BrokerAddressError> {
        let address = BrokerAddress::parse(&self.config.broker_url)?;
        let qos = qos_from(self.config.qos);
        let reconnect_delay = Duration::from_secs(self.config.reconnect_delay_secs);

        let (client, mut eventloop) = AsyncClient::new(self.options(&address), 10);

        info!(broker = %address, topic = %self.config.topic, "Starting MQTT source");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(broker = %address, "Connected to MQTT broker");
                    if let Err(e) = client.try_subscribe(&self.config.topic, qos) {
                        warn!(topic = %self.config.topic, error = %e, "Failed to queue subscription");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(topic = %self.config.topic, codes = ?ack.return_codes, "Subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.listener.on_message(&publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    self.listener.on_delivery_ack(ack.pkid);
                }
                Ok(_) => {}
                Err(e) => {
                    self.listener.on_connection_lost(&e);
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    }
}

fn qos_from(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
