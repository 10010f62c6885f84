//! Periodic dispatch of the latest envelope.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, warn};

use crate::buffer::LatestEnvelope;
use crate::forwarder::{Forwarder, Pending};
use crate::normalizer::Normalizer;

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing has been received yet.
    Idle,
    /// The held payload is not an envelope; nothing was sent.
    ParseFailed,
    /// The tick body panicked; nothing further was sent.
    Aborted,
    /// One send was started per measurement.
    Dispatched {
        pending: Vec<Pending>,
        skipped: usize,
    },
}

impl TickOutcome {
    /// Number of sends started by this tick.
    pub fn sent(&self) -> usize {
        match self {
            TickOutcome::Dispatched { pending, .. } => pending.len(),
            _ => 0,
        }
    }
}

/// Reads the buffer once per interval, normalizes it, and hands every
/// measurement to the forwarder without waiting for delivery.
#[derive(Debug, Clone)]
pub struct DispatchTicker {
    buffer: LatestEnvelope,
    normalizer: Normalizer,
    forwarder: Forwarder,
    interval: Duration,
}

impl DispatchTicker {
    /// `interval` is raised to [`MIN_PERIOD`] when shorter.
    pub fn new(
        buffer: LatestEnvelope,
        normalizer: Normalizer,
        forwarder: Forwarder,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            normalizer,
            forwarder,
            interval: interval.max(MIN_PERIOD),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick forever, starting immediately.
    pub async fn run(self) {
        debug!(interval_secs = self.interval.as_secs_f64(), "Starting dispatch ticker");
        run_fixed_rate(self.interval, || {
            // Deliveries report through their own logs.
            drop(self.tick());
            std::future::ready(())
        })
        .await
    }

    /// Execute one tick body. Never panics.
    pub fn tick(&self) -> TickOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.tick_body())) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Tick aborted by an unexpected failure; ticker keeps running");
                TickOutcome::Aborted
            }
        }
    }

    fn tick_body(&self) -> TickOutcome {
        let Some(payload) = self.buffer.take_snapshot() else {
            return TickOutcome::Idle;
        };

        let normalized = match self.normalizer.normalize(&payload) {
            Ok(normalized) => normalized,
            Err(e) => {
                error!(error = %e, size = payload.len(), "Failed to parse envelope, skipping tick");
                return TickOutcome::ParseFailed;
            }
        };

        for skipped in &normalized.skipped {
            warn!(tag = %skipped.tag_name, reason = %skipped.reason, "Skipping reading");
        }

        let skipped = normalized.skipped.len();
        let pending: Vec<Pending> = normalized
            .into_iter()
            .map(|measurement| self.forwarder.send(measurement))
            .collect();

        debug!(sent = pending.len(), skipped, "Tick dispatched");

        TickOutcome::Dispatched { pending, skipped }
    }
}

/// Shortest period [`run_fixed_rate`] will schedule at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Roughly 30 years out; used when `instant + period` does not fit.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Run `body` at a fixed rate, first call immediately.
///
/// Calls never overlap. Nominal firings that pass while a call is still
/// running are skipped, and the next call waits for the following firing.
/// Periods below [`MIN_PERIOD`] are raised to it; periods too large to
/// represent as an instant never fire again after the first call.
pub async fn run_fixed_rate<F, Fut>(period: Duration, mut body: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if period < MIN_PERIOD {
        warn!(period_ms = period.as_millis() as u64, "Tick period too short, clamping to 1ms");
    }
    let period = period.max(MIN_PERIOD);
    let mut next = Instant::now();

    loop {
        sleep_until(next).await;
        body().await;

        next = advance(next, period);
        let now = Instant::now();
        let mut missed = 0u64;
        while next < now {
            next = advance(next, period);
            missed += 1;
        }
        if missed > 0 {
            warn!(missed, "Tick overran its interval, skipping missed firings");
        }
    }
}

fn advance(instant: Instant, period: Duration) -> Instant {
    instant
        .checked_add(period)
        .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
}
