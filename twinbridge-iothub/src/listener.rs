//! Callback surface handed to the subscribe-side transport.

use std::fmt::Display;

use tracing::{debug, error, info, trace};

use crate::buffer::LatestEnvelope;

/// Callbacks a subscribe-side transport invokes from its own task or thread.
///
/// Implementations must return promptly and never panic: they run inside the
/// transport's delivery path.
pub trait TransportListener: Send + Sync {
    /// A payload arrived on `topic`.
    fn on_message(&self, topic: &str, payload: &[u8]);

    /// The transport lost its connection.
    fn on_connection_lost(&self, cause: &dyn Display);

    /// The transport acknowledged an outbound packet. Unused by subscribers.
    fn on_delivery_ack(&self, _token: u16) {}
}

/// Listener that stores every incoming payload into the latest-envelope buffer.
#[derive(Debug, Clone)]
pub struct IngestionListener {
    buffer: LatestEnvelope,
}

impl IngestionListener {
    pub fn new(buffer: LatestEnvelope) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &LatestEnvelope {
        &self.buffer
    }
}

impl TransportListener for IngestionListener {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.buffer.put(payload);
        info!(topic = %topic, size = payload.len(), "Received envelope");
        debug!(topic = %topic, payload = %String::from_utf8_lossy(payload), "Envelope payload");
    }

    fn on_connection_lost(&self, cause: &dyn Display) {
        error!(cause = %cause, "Subscribe-side connection lost");
    }

    fn on_delivery_ack(&self, token: u16) {
        trace!(token, "Delivery ack ignored by subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_message_overwrites_buffer() {
        let listener = IngestionListener::new(LatestEnvelope::new());

        listener.on_message("plant/telemetry", br#"{"timestamp":1}"#);
        listener.on_message("plant/telemetry", br#"{"timestamp":2}"#);

        let snapshot = listener.buffer().take_snapshot().unwrap();
        assert_eq!(snapshot.as_slice(), br#"{"timestamp":2}"#);
    }

    #[test]
    fn test_connection_events_leave_buffer_untouched() {
        let listener = IngestionListener::new(LatestEnvelope::new());
        listener.on_message("t", b"kept");

        listener.on_connection_lost(&"broker closed the connection");
        listener.on_delivery_ack(7);

        assert_eq!(listener.buffer().take_snapshot().unwrap().as_slice(), b"kept");
    }

    #[test]
    fn test_non_utf8_payload_is_stored() {
        let listener = IngestionListener::new(LatestEnvelope::new());
        listener.on_message("t", &[0xff, 0xfe, 0x00]);

        assert_eq!(
            listener.buffer().take_snapshot().unwrap().as_slice(),
            &[0xff, 0xfe, 0x00]
        );
    }
}
