//! Configuration for the IoT Hub bridge.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use twinbridge_common::config::{LoggingConfig, ZenohConfig};
use twinbridge_framework::{BridgeConfig, BridgeError};

use crate::iothub::DeviceConnectionString;
use crate::source::mqtt::BrokerAddress;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IotHubBridgeConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where envelopes come from
    pub source: SourceConfig,

    /// Azure IoT Hub device settings
    #[serde(default)]
    pub iothub: IotHubConfig,

    /// Tick cadence and measurement labelling
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Subscribe-side transport selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// MQTT broker subscription
    Mqtt(MqttSourceConfig),
    /// Zenoh key expression subscription
    Zenoh(ZenohSourceConfig),
}

impl SourceConfig {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Mqtt(_) => "mqtt",
            SourceConfig::Zenoh(_) => "zenoh",
        }
    }
}

/// MQTT subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSourceConfig {
    /// Broker URL: `mqtt://`, `tcp://`, `mqtts://`, `ssl://` or bare `host[:port]`
    pub broker_url: String,

    /// Topic filter carrying the envelopes
    pub topic: String,

    /// Broker username
    #[serde(default)]
    pub username: Option<String>,

    /// Broker password (prefer `--mqtt-password` / `MQTT_PASSWORD`)
    #[serde(default)]
    pub password: Option<String>,

    /// Client id; a random `twinbridge-<uuid>` is used when absent
    #[serde(default)]
    pub client_id: Option<String>,

    /// Subscription QoS (0, 1 or 2)
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Pause after a connection error before polling again
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

/// Zenoh subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZenohSourceConfig {
    /// Zenoh session settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Key expression carrying the envelopes
    pub key_expr: String,
}

/// Azure IoT Hub device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IotHubConfig {
    /// Device connection string (prefer `--iothub-connection-string` /
    /// `IOTHUB_DEVICE_CONNECTION_STRING`)
    #[serde(default)]
    pub connection_string: String,

    /// Lifetime of generated SAS tokens in seconds
    #[serde(default = "default_sas_ttl")]
    pub sas_ttl_secs: u64,

    /// MQTT port of the hub (TLS)
    #[serde(default = "default_iothub_port")]
    pub port: u16,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Pause after a connection error before polling again
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Outbound request queue capacity of the MQTT client
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for the hub to acknowledge a message
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
}

impl Default for IotHubConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            sas_ttl_secs: default_sas_ttl(),
            port: default_iothub_port(),
            keep_alive_secs: default_keep_alive(),
            reconnect_delay_secs: default_reconnect_delay(),
            queue_capacity: default_queue_capacity(),
            ack_timeout_secs: default_ack_timeout(),
        }
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between ticks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Label written into every measurement's `deviceName`
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            device_name: default_device_name(),
        }
    }
}

impl DispatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_sas_ttl() -> u64 {
    3600
}

fn default_iothub_port() -> u16 {
    8883
}

fn default_queue_capacity() -> usize {
    100
}

fn default_ack_timeout() -> u64 {
    30
}

fn default_interval() -> u64 {
    30
}

fn default_device_name() -> String {
    "Socomech".to_string()
}

impl BridgeConfig for IotHubBridgeConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> twinbridge_framework::Result<()> {
        match &self.source {
            SourceConfig::Mqtt(mqtt) => {
                BrokerAddress::parse(&mqtt.broker_url)
                    .map_err(|e| BridgeError::validation(e.to_string()))?;

                if mqtt.topic.is_empty() {
                    return Err(BridgeError::validation("source.topic cannot be empty"));
                }
                if mqtt.qos > 2 {
                    return Err(BridgeError::validation(format!(
                        "source.qos must be 0, 1 or 2 (got {})",
                        mqtt.qos
                    )));
                }
                if mqtt.password.is_some() && mqtt.username.is_none() {
                    return Err(BridgeError::validation(
                        "source.password requires source.username",
                    ));
                }
            }
            SourceConfig::Zenoh(zenoh) => {
                zenoh.zenoh.validate()?;
                if zenoh.key_expr.is_empty() {
                    return Err(BridgeError::validation("source.key_expr cannot be empty"));
                }
            }
        }

        if self.iothub.connection_string.is_empty() {
            return Err(BridgeError::validation(
                "iothub.connection_string is required (or set IOTHUB_DEVICE_CONNECTION_STRING)",
            ));
        }
        DeviceConnectionString::parse(&self.iothub.connection_string)
            .map_err(|e| BridgeError::validation(e.to_string()))?;

        if self.iothub.sas_ttl_secs == 0 {
            return Err(BridgeError::validation("iothub.sas_ttl_secs must be > 0"));
        }
        if self.iothub.ack_timeout_secs == 0 {
            return Err(BridgeError::validation(
                "iothub.ack_timeout_secs must be > 0",
            ));
        }

        if self.dispatch.interval_secs == 0 {
            return Err(BridgeError::validation("dispatch.interval_secs must be > 0"));
        }
        if self.dispatch.device_name.is_empty() {
            return Err(BridgeError::validation(
                "dispatch.device_name cannot be empty",
            ));
        }

        Ok(())
    }
}

impl IotHubBridgeConfig {
    /// Replace secrets with values supplied on the command line or environment.
    pub fn apply_secret_overrides(
        &mut self,
        connection_string: Option<&str>,
        mqtt_password: Option<&str>,
    ) {
        if let Some(cs) = connection_string {
            self.iothub.connection_string = cs.to_string();
        }
        if let (Some(password), SourceConfig::Mqtt(mqtt)) = (mqtt_password, &mut self.source) {
            mqtt.password = Some(password.to_string());
        }
    }
}
