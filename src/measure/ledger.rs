//! Byte accounting shared by the transfer workers of a phase.
//!
//! Download workers append `(arrival, bytes)` entries to a [`ByteLedger`];
//! the sampling ticker turns the entries inside a trailing window into a
//! rate with [`windowed_rate_mbps`]. Upload workers only report completed
//! payloads, so they share a [`TransferCounter`] and the ticker derives an
//! interval rate from it with [`IntervalRate`].

use crate::stats::mbps;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Bytes received within the trailing window, in Mbps.
///
/// The window shrinks to the time elapsed since `started` while the phase
/// is younger than `window`. Entries are counted when they arrived after
/// `now - effective_window` and no later than `now`.
pub fn windowed_rate_mbps(
    entries: &[(Instant, u64)],
    now: Instant,
    started: Instant,
    window: Duration,
) -> f64 {
    let effective = now.saturating_duration_since(started).min(window);
    if effective.is_zero() {
        return 0.0;
    }

    let cutoff = now - effective;
    let bytes: u64 = entries
        .iter()
        .filter(|(at, _)| *at > cutoff && *at <= now)
        .map(|(_, bytes)| bytes)
        .sum();

    mbps(bytes, effective)
}

/// Append-only log of received chunks.
#[derive(Debug, Default)]
pub struct ByteLedger {
    entries: Mutex<Vec<(Instant, u64)>>,
}

impl ByteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, at: Instant, bytes: u64) {
        self.entries().push((at, bytes));
    }

    /// Current windowed rate. Entries that fell out of the window are
    /// discarded on the way.
    pub fn rate_mbps(
        &self,
        now: Instant,
        started: Instant,
        window: Duration,
    ) -> f64 {
        let mut entries = self.entries();

        if let Some(horizon) = now.checked_sub(window) {
            entries.retain(|(at, _)| *at > horizon);
        }

        windowed_rate_mbps(&entries, now, started, window)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A worker that panicked mid-push leaves whole entries behind, so the
    /// log stays usable.
    fn entries(&self) -> MutexGuard<'_, Vec<(Instant, u64)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cumulative byte count of completed transfers.
#[derive(Debug, Default)]
pub struct TransferCounter {
    total: AtomicU64,
}

impl TransferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Rate between consecutive reports of a cumulative counter.
#[derive(Debug, Clone, Copy)]
pub struct IntervalRate {
    previous_total: u64,
    previous_at: Instant,
}

impl IntervalRate {
    pub fn new(started: Instant) -> Self {
        Self { previous_total: 0, previous_at: started }
    }

    /// `(total - previous_total) / (now - previous_report)` in Mbps.
    pub fn sample(&mut self, total: u64, now: Instant) -> f64 {
        let bytes = total.saturating_sub(self.previous_total);
        let elapsed = now.saturating_duration_since(self.previous_at);

        self.previous_total = total;
        self.previous_at = now;

        mbps(bytes, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_window_shrinks_to_elapsed_time() {
        let started = Instant::now();
        // 125 KB every 10 ms for 500 ms: 100 Mbps
        let entries: Vec<_> =
            (1..=50).map(|i| (started + ms(i * 10), 125_000)).collect();

        let rate =
            windowed_rate_mbps(&entries, started + ms(500), started, ms(3000));

        assert!((rate - 100.0).abs() < 1e-9, "rate was {}", rate);
    }

    #[test]
    fn test_window_excludes_old_entries() {
        let started = Instant::now();
        let entries = vec![
            (started + ms(100), 10_000_000),
            (started + ms(3500), 375_000),
            (started + ms(4000), 375_000),
        ];

        // The window is (1000, 4000]; the early burst is outside it
        let rate =
            windowed_rate_mbps(&entries, started + ms(4000), started, ms(3000));

        assert!((rate - 2.0).abs() < 1e-9, "rate was {}", rate);
    }

    #[test]
    fn test_window_at_start_is_zero() {
        let started = Instant::now();
        assert_eq!(windowed_rate_mbps(&[], started, started, ms(3000)), 0.0);
    }

    #[test]
    fn test_ledger_prunes_expired_entries() {
        let started = Instant::now();
        let ledger = ByteLedger::new();

        ledger.record(started + ms(10), 1_000);
        ledger.record(started + ms(5000), 1_000);
        let _ = ledger.rate_mbps(started + ms(5000), started, ms(3000));

        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_ledger_survives_poisoned_lock() {
        let started = Instant::now();
        let ledger = ByteLedger::new();
        ledger.record(started + ms(100), 125_000);

        let worker = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _entries = ledger.entries.lock().unwrap();
                    panic!("worker died while recording");
                })
                .join()
        });
        assert!(worker.is_err());
        assert!(ledger.entries.is_poisoned());

        ledger.record(started + ms(200), 125_000);

        assert_eq!(ledger.len(), 2);
        // 250 KB over the first second is 2 Mbps
        let rate = ledger.rate_mbps(started + ms(1000), started, ms(3000));
        assert!((rate - 2.0).abs() < 1e-9, "rate was {}", rate);
    }

    #[test]
    fn test_interval_rate() {
        let started = Instant::now();
        let counter = TransferCounter::new();
        let mut rate = IntervalRate::new(started);

        counter.add(3_125_000);
        // 3.125 MB in 250 ms is 100 Mbps
        let first = rate.sample(counter.total(), started + ms(250));
        assert!((first - 100.0).abs() < 1e-9);

        // Nothing completed in the next interval
        let second = rate.sample(counter.total(), started + ms(500));
        assert_eq!(second, 0.0);
    }
}
