//! Fire-and-forget delivery of normalized measurements to the cloud client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};
use twinbridge_common::NormalizedMeasurement;

/// Per-message delivery failure reported by a [`CloudClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Failed to serialize measurement: {0}")]
    Serialization(String),
    #[error("Cloud endpoint rejected message: {0}")]
    Rejected(String),
    #[error("Connection lost before acknowledgement: {0}")]
    Connection(String),
    #[error("No acknowledgement within {0:?}")]
    Timeout(Duration),
    #[error("Cloud client is closed")]
    Closed,
}

/// Publish-side cloud client: accepts one serialized message at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Send one telemetry message. Resolves once the client reports the outcome.
    async fn send_event(&self, payload: Vec<u8>) -> Result<(), DeliveryError>;
}

/// Handle to an in-flight delivery. Dropping it does not cancel the send.
pub type Pending = JoinHandle<Result<(), DeliveryError>>;

/// Sends each measurement on its own task and logs the outcome.
///
/// No retries and no ordering between in-flight sends: a failed measurement
/// is logged and dropped.
#[derive(Clone)]
pub struct Forwarder {
    client: Arc<dyn CloudClient>,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder").finish_non_exhaustive()
    }
}

impl Forwarder {
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self { client }
    }

    /// Start delivering `measurement` and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send(&self, measurement: NormalizedMeasurement) -> Pending {
        let client = Arc::clone(&self.client);
        tokio::spawn(deliver(client, measurement))
    }
}

async fn deliver(
    client: Arc<dyn CloudClient>,
    measurement: NormalizedMeasurement,
) -> Result<(), DeliveryError> {
    let payload = measurement.to_json_bytes().map_err(|e| {
        let err = DeliveryError::Serialization(e.to_string());
        error!(tag = %measurement.tag_name, error = %err, "Dropping measurement");
        err
    })?;

    match client.send_event(payload).await {
        Ok(()) => {
            info!(
                tag = %measurement.tag_name,
                value = measurement.value,
                device_id = %measurement.device_id,
                timestamp = measurement.timestamp,
                "Sent normalized measurement"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                tag = %measurement.tag_name,
                device_id = %measurement.device_id,
                error = %e,
                "Failed to deliver measurement"
            );
            Err(e)
        }
    }
}
