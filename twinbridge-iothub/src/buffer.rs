//! Single-slot, last-value-wins holder for the most recent raw envelope.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Shared handle to the latest raw payload.
///
/// Writers replace the slot with an atomic pointer swap and readers load it
/// without clearing it, so neither side ever waits on the other. Clones share
/// the same slot.
#[derive(Debug, Clone, Default)]
pub struct LatestEnvelope {
    slot: Arc<ArcSwapOption<Vec<u8>>>,
}

impl LatestEnvelope {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held payload, discarding the previous one whether it was read or not.
    pub fn put(&self, payload: impl Into<Vec<u8>>) {
        self.slot.store(Some(Arc::new(payload.into())));
    }

    /// Return the held payload without clearing it.
    ///
    /// `None` until the first [`put`](Self::put).
    pub fn take_snapshot(&self) -> Option<Arc<Vec<u8>>> {
        self.slot.load_full()
    }
}
