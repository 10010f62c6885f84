//! Matching of outbound telemetry publishes to hub acknowledgements.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::forwarder::DeliveryError;

type Waiter = oneshot::Sender<Result<(), DeliveryError>>;

/// Receives the outcome of one publish.
pub(crate) type AckReceiver = oneshot::Receiver<Result<(), DeliveryError>>;

/// Delivery waiters for publishes handed to the MQTT client.
///
/// Waiters are queued in request order and bound to a packet id when the
/// event loop writes the publish out, then resolved by the matching PubAck.
/// Packet ids seen again while bound (or after their waiter was failed by
/// a connection error) are retransmissions and bind nothing new.
#[derive(Debug, Default)]
pub(crate) struct AckTracker {
    queued: VecDeque<Waiter>,
    in_flight: HashMap<u16, Waiter>,
    orphaned: HashSet<u16>,
    closed: bool,
}

impl AckTracker {
    /// Register a publish that is about to enter the request queue.
    pub(crate) fn enqueue(&mut self) -> Result<AckReceiver, DeliveryError> {
        if self.closed {
            return Err(DeliveryError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        self.queued.push_back(tx);
        Ok(rx)
    }

    /// Drop the latest waiter when its publish never reached the queue.
    pub(crate) fn cancel_latest(&mut self) {
        self.queued.pop_back();
    }

    /// The event loop wrote a publish with `pkid` to the network.
    pub(crate) fn on_outgoing(&mut self, pkid: u16) {
        if self.in_flight.contains_key(&pkid) || self.orphaned.contains(&pkid) {
            return;
        }
        if let Some(waiter) = self.queued.pop_front() {
            self.in_flight.insert(pkid, waiter);
        }
    }

    /// The hub acknowledged `pkid`. Returns whether a waiter was resolved.
    pub(crate) fn on_ack(&mut self, pkid: u16) -> bool {
        self.orphaned.remove(&pkid);
        match self.in_flight.remove(&pkid) {
            Some(waiter) => {
                let _ = waiter.send(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Fail every publish written but not yet acknowledged.
    pub(crate) fn fail_in_flight(&mut self, cause: &str) -> usize {
        let failed = self.in_flight.len();
        for (pkid, waiter) in self.in_flight.drain() {
            self.orphaned.insert(pkid);
            let _ = waiter.send(Err(DeliveryError::Connection(cause.to_string())));
        }
        failed
    }

    /// Publishes accepted by the client but not yet written out.
    pub(crate) fn waiting(&self) -> usize {
        self.queued.len()
    }

    /// Fail everything outstanding and refuse new publishes.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.orphaned.clear();
        for waiter in self
            .queued
            .drain(..)
            .chain(self.in_flight.drain().map(|(_, waiter)| waiter))
        {
            let _ = waiter.send(Err(DeliveryError::Closed));
        }
    }
}

/// Lock the tracker, recovering it if a holder panicked.
pub(crate) fn lock(tracker: &Mutex<AckTracker>) -> MutexGuard<'_, AckTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}
