use crate::echo::Transport;
use crate::errors::SpeedTestError;
use crate::progress::{Phase, ProgressCallback, ProgressEvent};
use crate::retry::cancellable_sleep;
use crate::stats::{median, round_to, stddev};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Latency figures from one ping phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingResult {
    /// Median round trip, whole milliseconds
    pub ping_ms: f64,
    /// Population standard deviation of the round trips, one decimal
    pub jitter_ms: f64,
    /// Successful round trips in milliseconds, in probe order
    pub samples: Vec<f64>,
}

impl PingResult {
    pub fn from_samples(samples: Vec<f64>) -> Self {
        Self {
            ping_ms: round_to(median(&samples), 0),
            jitter_ms: round_to(stddev(&samples), 1),
            samples,
        }
    }
}

/// Run `count` sequential probes separated by `delay`.
///
/// Failed probes are dropped. Only cancellation ends the phase early.
pub async fn measure_ping<T: Transport>(
    transport: &T,
    count: usize,
    delay: Duration,
    cancel: &CancellationToken,
    progress: &dyn ProgressCallback,
) -> Result<PingResult, SpeedTestError> {
    let mut samples = Vec::with_capacity(count);

    for i in 0..count {
        if cancel.is_cancelled() {
            return Err(SpeedTestError::cancelled());
        }

        let begin = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(SpeedTestError::cancelled()),
            outcome = transport.ping() => outcome,
        };

        match outcome {
            Ok(()) => {
                let value_ms = begin.elapsed().as_secs_f64() * 1000.0;
                debug!("Ping {}/{}: {:.2} ms", i + 1, count, value_ms);
                samples.push(value_ms);

                progress.on_progress(ProgressEvent::LatencySample {
                    value_ms,
                    current: i + 1,
                    total: count,
                });
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!("Ping {}/{} failed: {}", i + 1, count, e.message);
            }
        }

        progress.on_progress(ProgressEvent::Progress {
            phase: Phase::Ping,
            percent: (i + 1) as f64 / count as f64 * 100.0,
        });

        if i + 1 < count {
            cancellable_sleep(cancel, delay).await?;
        }
    }

    if samples.len() < count {
        warn!(
            "{} of {} ping probes failed, continuing with {} successful",
            count - samples.len(),
            count,
            samples.len()
        );
    }

    let result = PingResult::from_samples(samples);
    info!("Ping: {} ms, jitter: {} ms", result.ping_ms, result.jitter_ms);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::fake::FakeTransport;
    use crate::progress::NoopProgress;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    fn ms(value: u64) -> Option<Duration> {
        Some(Duration::from_millis(value))
    }

    #[tokio::test(start_paused = true)]
    async fn test_median_ignores_outlier_probe() {
        let transport = FakeTransport::new().with_ping_script(vec![
            ms(20),
            ms(22),
            ms(21),
            ms(1000),
        ]);
        let cancel = CancellationToken::new();

        let result = measure_ping(
            &transport,
            4,
            Duration::from_millis(100),
            &cancel,
            &NoopProgress,
        )
        .await
        .unwrap();

        assert!(
            result.ping_ms == 21.0 || result.ping_ms == 22.0,
            "ping was {}",
            result.ping_ms
        );
        assert!(result.jitter_ms > 0.0);
        assert_eq!(result.samples.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probes_are_dropped() {
        let transport = FakeTransport::new().with_ping_script(vec![
            ms(30),
            None,
            ms(30),
            None,
            ms(30),
        ]);
        let cancel = CancellationToken::new();
        let events = Mutex::new(Vec::new());
        let progress =
            |event: ProgressEvent| events.lock().unwrap().push(event);

        let result = measure_ping(
            &transport,
            5,
            Duration::from_millis(100),
            &cancel,
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.ping_ms, 30.0);
        assert_eq!(result.jitter_ms, 0.0);
        assert_eq!(transport.pings.load(Ordering::SeqCst), 5);

        let events = events.lock().unwrap();
        let latency_events = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::LatencySample { .. }))
            .count();
        assert_eq!(latency_events, 3);
        assert!(events.contains(&ProgressEvent::Progress {
            phase: Phase::Ping,
            percent: 100.0,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_probes_failing_degrades_to_zero() {
        let transport =
            FakeTransport::new().with_ping_script(vec![None, None, None]);
        let cancel = CancellationToken::new();

        let result = measure_ping(
            &transport,
            3,
            Duration::from_millis(100),
            &cancel,
            &NoopProgress,
        )
        .await
        .unwrap();

        assert_eq!(result, PingResult::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_promptly() {
        let transport = FakeTransport::new();
        let cancel = CancellationToken::new();
        let begin = Instant::now();

        let (result, _) = tokio::join!(
            measure_ping(
                &transport,
                20,
                Duration::from_millis(100),
                &cancel,
                &NoopProgress,
            ),
            async {
                tokio::time::sleep(Duration::from_millis(250)).await;
                cancel.cancel();
            }
        );

        assert!(result.unwrap_err().is_cancelled());
        assert!(begin.elapsed() < Duration::from_millis(300));
    }
}
