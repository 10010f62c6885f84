//! Bridge from MQTT/Zenoh telemetry envelopes to Azure IoT Hub.
//!
//! Keeps the latest envelope received on the configured source and, on a
//! fixed interval, sends one device-to-cloud message per reading.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use twinbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use twinbridge_iothub::config::{IotHubBridgeConfig, SourceConfig};
use twinbridge_iothub::iothub::IotHubClient;
use twinbridge_iothub::normalizer::Normalizer;
use twinbridge_iothub::source::{MqttSource, ZenohSource};
use twinbridge_iothub::{DispatchTicker, Forwarder, IngestionListener, LatestEnvelope};

#[derive(Parser, Debug)]
#[command(name = "twinbridge-iothub")]
#[command(about = "Forwards the latest telemetry envelope to Azure IoT Hub")]
#[command(version)]
struct Args {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// Device connection string, overrides `iothub.connection_string`.
    #[arg(long, env = "IOTHUB_DEVICE_CONNECTION_STRING", hide_env_values = true)]
    iothub_connection_string: Option<String>,

    /// MQTT broker password, overrides `source.password`.
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = IotHubBridgeConfig::load_with(&args.bridge.config, |config| {
        config.apply_secret_overrides(
            args.iothub_connection_string.as_deref(),
            args.mqtt_password.as_deref(),
        )
    })
    .with_context(|| format!("Failed to load config from {:?}", args.bridge.config))?;

    let mut runner = BridgeRunner::new_with_args("iothub", config, Some(&args.bridge))?
        .with_version(env!("CARGO_PKG_VERSION"));

    let (client, connection) =
        IotHubClient::open(&runner.config().iothub).context("Failed to open IoT Hub client")?;
    runner.spawn(connection.run());

    let buffer = LatestEnvelope::new();
    let listener = Arc::new(IngestionListener::new(buffer.clone()));

    let source = runner.config().source.clone();
    tracing::info!(source = source.kind(), "Starting envelope source");
    match source {
        SourceConfig::Mqtt(mqtt) => {
            runner.spawn_with_error("mqtt-source", MqttSource::new(mqtt, listener).run());
        }
        SourceConfig::Zenoh(zenoh) => {
            runner.spawn_with_error("zenoh-source", ZenohSource::new(zenoh, listener).run());
        }
    }

    let dispatch = runner.config().dispatch.clone();
    let ticker = DispatchTicker::new(
        buffer,
        Normalizer::new(dispatch.device_name.clone()),
        Forwarder::new(Arc::new(client.clone())),
        dispatch.interval(),
    );
    tracing::info!(
        interval_secs = dispatch.interval_secs,
        device_name = %dispatch.device_name,
        topic = %client.topic(),
        "IoT Hub bridge running"
    );
    runner.spawn(ticker.run());

    // Queue the hub DISCONNECT before the runner aborts the connection task.
    runner
        .run_until(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            client.disconnect().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await?;

    Ok(())
}
