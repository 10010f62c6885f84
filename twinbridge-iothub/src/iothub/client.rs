//! Azure IoT Hub device client over MQTT.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS, Transport,
};
use tracing::{debug, error, info, warn};

use super::ack::{AckTracker, lock};
use super::connection_string::{ConnectionStringError, DeviceConnectionString};
use super::sas::SasToken;
use crate::config::IotHubConfig;
use crate::forwarder::{CloudClient, DeliveryError};

/// MQTT API version advertised in the username.
pub const API_VERSION: &str = "2021-04-12";

/// Renew the SAS token when it has less than this many seconds left.
const TOKEN_RENEWAL_MARGIN_SECS: i64 = 60;

/// Publish handle for device-to-cloud telemetry.
///
/// A send completes when the hub acknowledges the message.
#[derive(Clone)]
pub struct IotHubClient {
    client: AsyncClient,
    topic: String,
    acks: Arc<Mutex<AckTracker>>,
    // Keeps waiter order identical to request queue order.
    send_order: Arc<tokio::sync::Mutex<()>>,
    ack_timeout: Duration,
}

impl std::fmt::Debug for IotHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IotHubClient")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Drives the MQTT event loop behind an [`IotHubClient`].
///
/// Must be polled for any message to leave the process. Dropping it fails
/// every send still waiting for an acknowledgement.
pub struct IotHubConnection {
    eventloop: EventLoop,
    acks: Arc<Mutex<AckTracker>>,
    credentials: DeviceConnectionString,
    username: String,
    token: SasToken,
    sas_ttl_secs: u64,
    reconnect_delay: Duration,
}

impl IotHubClient {
    /// Build the hub session from configuration.
    ///
    /// Nothing touches the network until [`IotHubConnection::run`] is polled.
    pub fn open(
        config: &IotHubConfig,
    ) -> Result<(IotHubClient, IotHubConnection), ConnectionStringError> {
        let credentials = DeviceConnectionString::parse(&config.connection_string)?;
        let username = mqtt_username(&credentials);
        let token = SasToken::generate_for(
            &credentials.resource_uri(),
            credentials.key(),
            config.sas_ttl_secs,
        );

        let mut options = MqttOptions::new(
            credentials.client_id(),
            credentials.connect_host(),
            config.port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);
        options.set_credentials(username.clone(), token.token.clone());
        options.set_transport(Transport::tls_with_default_config());

        let (client, eventloop) = AsyncClient::new(options, config.queue_capacity);

        info!(
            host = %credentials.connect_host(),
            device_id = %credentials.device_id,
            expires_at = token.expires_at,
            "Opening Azure IoT Hub session"
        );

        let acks = Arc::new(Mutex::new(AckTracker::default()));
        let client = IotHubClient {
            client,
            topic: telemetry_topic(&credentials),
            acks: acks.clone(),
            send_order: Arc::new(tokio::sync::Mutex::new(())),
            ack_timeout: Duration::from_secs(config.ack_timeout_secs),
        };
        let connection = IotHubConnection {
            eventloop,
            acks,
            credentials,
            username,
            token,
            sas_ttl_secs: config.sas_ttl_secs,
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
        };

        Ok((client, connection))
    }

    /// Topic telemetry is published on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ask the hub connection to close.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "IoT Hub disconnect request not delivered");
        }
    }
}

#[async_trait]
impl CloudClient for IotHubClient {
    async fn send_event(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        let ack = {
            let _order = self.send_order.lock().await;
            let ack = lock(&self.acks).enqueue()?;
            if let Err(e) = self
                .client
                .publish(&self.topic, QoS::AtLeastOnce, false, payload)
                .await
            {
                lock(&self.acks).cancel_latest();
                return Err(match e {
                    ClientError::Request(_) => DeliveryError::Closed,
                    other => DeliveryError::Rejected(other.to_string()),
                });
            }
            ack
        };

        match tokio::time::timeout(self.ack_timeout, ack).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Timeout(self.ack_timeout)),
        }
    }
}

impl IotHubConnection {
    /// Poll the event loop forever, renewing the SAS token across reconnects.
    pub async fn run(mut self) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!(device_id = %self.credentials.device_id, "Connected to Azure IoT Hub");
                    } else {
                        warn!(code = ?ack.code, "Azure IoT Hub refused the connection");
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    lock(&self.acks).on_outgoing(pkid);
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    let matched = lock(&self.acks).on_ack(ack.pkid);
                    debug!(pkid = ack.pkid, matched, "IoT Hub acknowledged telemetry");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Azure IoT Hub closed the session");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Azure IoT Hub connection error");
                    let (failed, waiting) = {
                        let mut acks = lock(&self.acks);
                        (acks.fail_in_flight(&e.to_string()), acks.waiting())
                    };
                    if failed > 0 {
                        warn!(failed, waiting, "Unacknowledged telemetry failed");
                    }
                    self.renew_token_if_needed();
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    fn renew_token_if_needed(&mut self) {
        let now = chrono::Utc::now().timestamp();
        if !self.token.expires_within(now, TOKEN_RENEWAL_MARGIN_SECS) {
            return;
        }

        self.token = SasToken::generate_for(
            &self.credentials.resource_uri(),
            self.credentials.key(),
            self.sas_ttl_secs,
        );
        self.eventloop
            .mqtt_options
            .set_credentials(self.username.clone(), self.token.token.clone());
        info!(expires_at = self.token.expires_at, "Renewed IoT Hub SAS token");
    }
}

impl Drop for IotHubConnection {
    fn drop(&mut self) {
        lock(&self.acks).close();
    }
}

fn mqtt_username(credentials: &DeviceConnectionString) -> String {
    format!(
        "{}/{}/?api-version={}",
        credentials.host_name,
        credentials.client_id(),
        API_VERSION
    )
}

/// Device-to-cloud topic, tagged so the hub can route on the JSON body.
fn telemetry_topic(credentials: &DeviceConnectionString) -> String {
    let base = match &credentials.module_id {
        Some(module) => format!(
            "devices/{}/modules/{}/messages/events/",
            credentials.device_id, module
        ),
        None => format!("devices/{}/messages/events/", credentials.device_id),
    };
    format!("{}$.ct=application%2Fjson&$.ce=utf-8", base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(cs: &str) -> DeviceConnectionString {
        DeviceConnectionString::parse(cs).unwrap()
    }

    #[test]
    fn test_device_username_and_topic() {
        let cs = credentials(
            "HostName=plant.azure-devices.net;DeviceId=Socomech;SharedAccessKey=c2VjcmV0LWtleQ==",
        );
        assert_eq!(
            mqtt_username(&cs),
            "plant.azure-devices.net/Socomech/?api-version=2021-04-12"
        );
        assert_eq!(
            telemetry_topic(&cs),
            "devices/Socomech/messages/events/$.ct=application%2Fjson&$.ce=utf-8"
        );
    }

    #[test]
    fn test_module_username_and_topic() {
        let cs = credentials("HostName=h;DeviceId=d;ModuleId=m;SharedAccessKey=c2VjcmV0LWtleQ==");
        assert_eq!(mqtt_username(&cs), "h/d/m/?api-version=2021-04-12");
        assert!(telemetry_topic(&cs).starts_with("devices/d/modules/m/messages/events/"));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_connection_string() {
        let config = IotHubConfig {
            connection_string: "HostName=h".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            IotHubClient::open(&config),
            Err(ConnectionStringError::Missing("DeviceId"))
        ));
    }

    fn config() -> IotHubConfig {
        IotHubConfig {
            connection_string:
                "HostName=plant.azure-devices.net;DeviceId=Socomech;SharedAccessKey=c2VjcmV0LWtleQ=="
                    .to_string(),
            ..Default::default()
        }
    }

    async fn wait_until_queued(connection: &IotHubConnection, count: usize) {
        while lock(&connection.acks).waiting() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_send_fails_once_connection_dropped() {
        let (client, connection) = IotHubClient::open(&config()).unwrap();
        drop(connection);

        assert_eq!(
            client.send_event(b"{}".to_vec()).await,
            Err(DeliveryError::Closed)
        );
    }

    #[tokio::test]
    async fn test_send_completes_on_matching_puback() {
        let (client, connection) = IotHubClient::open(&config()).unwrap();
        let sender = client.clone();
        let send = tokio::spawn(async move { sender.send_event(b"{}".to_vec()).await });

        wait_until_queued(&connection, 1).await;
        lock(&connection.acks).on_outgoing(1);
        assert!(!send.is_finished());

        assert!(lock(&connection.acks).on_ack(1));
        assert_eq!(send.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_send_fails_when_connection_breaks_before_puback() {
        let (client, connection) = IotHubClient::open(&config()).unwrap();
        let sender = client.clone();
        let send = tokio::spawn(async move { sender.send_event(b"{}".to_vec()).await });

        wait_until_queued(&connection, 1).await;
        lock(&connection.acks).on_outgoing(1);
        lock(&connection.acks).fail_in_flight("connection reset by peer");

        assert_eq!(
            send.await.unwrap(),
            Err(DeliveryError::Connection(
                "connection reset by peer".to_string()
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_without_puback() {
        let config = IotHubConfig {
            ack_timeout_secs: 10,
            ..config()
        };
        let (client, _connection) = IotHubClient::open(&config).unwrap();

        assert_eq!(
            client.send_event(b"{}".to_vec()).await,
            Err(DeliveryError::Timeout(Duration::from_secs(10)))
        );
    }
}
