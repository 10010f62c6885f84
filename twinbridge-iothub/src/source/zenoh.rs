//! Zenoh key expression subscription.

use std::sync::Arc;

use tracing::{info, trace};
use twinbridge_common::Result;
use zenoh::Session;
use zenoh::sample::SampleKind;

use crate::config::ZenohSourceConfig;
use crate::listener::TransportListener;

/// Subscribes to a key expression and feeds every put sample to a listener.
pub struct ZenohSource {
    config: ZenohSourceConfig,
    listener: Arc<dyn TransportListener>,
}

impl ZenohSource {
    pub fn new(config: ZenohSourceConfig, listener: Arc<dyn TransportListener>) -> Self {
        Self { config, listener }
    }

    /// Open a session from configuration and subscribe.
    pub async fn run(self) -> Result<()> {
        let session = twinbridge_common::connect(&self.config.zenoh).await?;
        self.run_with_session(session).await
    }

    /// Subscribe on an existing session until it closes.
    pub async fn run_with_session(self, session: Session) -> Result<()> {
        let key_expr = self.config.key_expr.clone();
        let subscriber = session.declare_subscriber(&key_expr).await?;

        info!(zid = %session.zid(), key_expr = %key_expr, "Subscribed to Zenoh");

        loop {
            match subscriber.recv_async().await {
                Ok(sample) => {
                    if sample.kind() == SampleKind::Delete {
                        trace!(key = %sample.key_expr(), "Ignoring delete sample");
                        continue;
                    }
                    let payload = sample.payload().to_bytes();
                    self.listener
                        .on_message(sample.key_expr().as_str(), &payload);
                }
                Err(e) => {
                    self.listener.on_connection_lost(&e);
                    return Ok(());
                }
            }
        }
    }
}
