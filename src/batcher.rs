//! Background worker that turns the record queue into collector calls.
//!
//! A batch is shipped when it reaches `batch_max_size` records or when
//! `batch_max_delay` has passed since its first record, whichever comes
//! first. One batch is in flight at a time, so batches reach the
//! collector in the order they were assembled.

use crate::config::ClientConfig;
use crate::error::DeliveryError;
use crate::record::LogRecord;
use crate::stats::Stats;
use crate::transport::Transport;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, error, warn};

/// Flush request: acknowledged once everything queued before it is resolved.
pub(crate) type FlushAck = oneshot::Sender<()>;

/// Exponential backoff with equal jitter.
///
/// The ceiling doubles from `initial` on every attempt and is capped at
/// `max`; the actual delay is drawn uniformly from `[ceiling / 2, ceiling]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            initial,
            max: max.max(initial),
        }
    }

    /// Upper bound of the delay after failed attempt number `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }

    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        let floor = ceiling / 2;
        floor + (ceiling - floor).mul_f64(rng.gen::<f64>())
    }
}

pub(crate) struct Batcher {
    rx: mpsc::Receiver<LogRecord>,
    flush_rx: mpsc::UnboundedReceiver<FlushAck>,
    shutdown: oneshot::Receiver<()>,
    transport: Arc<dyn Transport>,
    stats: Arc<Stats>,
    batch: Vec<LogRecord>,
    batch_max_size: usize,
    batch_max_delay: Duration,
    max_attempts: u32,
    backoff: Backoff,
    rng: SmallRng,
}

impl Batcher {
    pub(crate) fn new(
        config: &ClientConfig,
        rx: mpsc::Receiver<LogRecord>,
        flush_rx: mpsc::UnboundedReceiver<FlushAck>,
        shutdown: oneshot::Receiver<()>,
        transport: Arc<dyn Transport>,
        stats: Arc<Stats>,
    ) -> Self {
        Batcher {
            rx,
            flush_rx,
            shutdown,
            transport,
            stats,
            batch: Vec::with_capacity(config.batch_max_size),
            batch_max_size: config.batch_max_size,
            batch_max_delay: config.batch_max_delay,
            max_attempts: config.max_attempts,
            backoff: Backoff::new(config.initial_backoff, config.max_backoff),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Run until shutdown is signalled (or the client is dropped) or every
    /// sender is gone, then drain what is left.
    pub(crate) async fn run(mut self) {
        let mut flush_at: Option<Instant> = None;

        loop {
            let deadline = flush_at;
            tokio::select! {
                biased;

                _ = &mut self.shutdown => break,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.ship().await;
                    flush_at = None;
                }
                Some(ack) = self.flush_rx.recv() => {
                    self.take_queued().await;
                    self.ship().await;
                    flush_at = None;
                    let _ = ack.send(());
                }
                record = self.rx.recv() => match record {
                    Some(record) => {
                        if self.batch.is_empty() {
                            flush_at = Some(Instant::now() + self.batch_max_delay);
                        }
                        self.batch.push(record);
                        if self.batch.len() >= self.batch_max_size {
                            self.ship().await;
                            flush_at = None;
                        }
                    }
                    None => break,
                },
            }
        }

        self.drain().await;
    }

    /// Refuse new records and ship everything already queued.
    async fn drain(mut self) {
        self.rx.close();
        self.flush_rx.close();
        while let Some(record) = self.rx.recv().await {
            self.push_and_ship_full(record).await;
        }
        self.ship().await;
        while let Ok(ack) = self.flush_rx.try_recv() {
            let _ = ack.send(());
        }
        debug!(sent = self.stats.snapshot().sent, "log batcher stopped");
    }

    /// Move records already sitting in the queue into batches.
    async fn take_queued(&mut self) {
        while let Ok(record) = self.rx.try_recv() {
            self.push_and_ship_full(record).await;
        }
    }

    async fn push_and_ship_full(&mut self, record: LogRecord) {
        self.batch.push(record);
        if self.batch.len() >= self.batch_max_size {
            self.ship().await;
        }
    }

    async fn ship(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_max_size));
        self.deliver(&batch).await;
    }

    async fn deliver(&mut self, batch: &[LogRecord]) {
        let mut attempt = 1;
        loop {
            match self.transport.send(batch).await {
                Ok(()) => {
                    Stats::add(&self.stats.sent, batch.len());
                    Stats::incr(&self.stats.batches_sent);
                    debug!(records = batch.len(), attempt, "log batch delivered");
                    return;
                }
                Err(DeliveryError::Permanent(reason)) => {
                    Stats::add(&self.stats.dropped_permanent, batch.len());
                    error!(records = batch.len(), %reason, "collector rejected log batch, dropping it");
                    return;
                }
                Err(DeliveryError::Transient(reason)) => {
                    if attempt >= self.max_attempts {
                        Stats::add(&self.stats.dropped_exhausted, batch.len());
                        error!(
                            records = batch.len(),
                            attempts = attempt,
                            %reason,
                            "giving up on log batch after repeated failures"
                        );
                        return;
                    }
                    let delay = self.backoff.delay(attempt, &mut self.rng);
                    warn!(attempt, ?delay, %reason, "log batch delivery failed, retrying");
                    Stats::incr(&self.stats.retries);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn backoff_ceiling_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(1), Duration::from_millis(100));
        assert_eq!(backoff.ceiling(2), Duration::from_millis(200));
        assert_eq!(backoff.ceiling(4), Duration::from_millis(800));
        assert_eq!(backoff.ceiling(5), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(64), Duration::from_secs(1));
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        let mut rng = SmallRng::seed_from_u64(7);
        for attempt in 1..8 {
            let ceiling = backoff.ceiling(attempt);
            for _ in 0..50 {
                let delay = backoff.delay(attempt, &mut rng);
                assert!(delay >= ceiling / 2 && delay <= ceiling, "{delay:?} outside {ceiling:?}");
            }
        }
    }

    #[test]
    fn consecutive_delays_never_shrink() {
        let backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(10));
        // Worst case for monotonicity: max jitter now, min jitter next.
        let mut high = StepRng::new(u64::MAX, 0);
        let mut low = StepRng::new(0, 0);
        for attempt in 1..6 {
            assert!(backoff.delay(attempt + 1, &mut low) >= backoff.delay(attempt, &mut high));
        }
    }

    #[test]
    fn max_below_initial_is_raised() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(3), Duration::from_secs(2));
    }
}
