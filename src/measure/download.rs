//! Download throughput over parallel streaming requests.
//!
//! After a discarded warm-up transfer, `download_streams` workers each keep
//! one bulk request open at a time, appending every body chunk to a shared
//! [`ByteLedger`]. The sampling ticker reads a sliding-window rate from the
//! ledger and ends the phase when its budget has elapsed.

use crate::echo::{ByteStream, Transport};
use crate::errors::SpeedTestError;
use crate::measure::engine::TestConfig;
use crate::measure::ledger::ByteLedger;
use crate::measure::{run_sampler, SamplerTiming, ThroughputResult};
use crate::progress::{BandwidthDirection, ProgressCallback};
use crate::retry::{cancellable_sleep, retry_async, RetryResult};
use futures::future::join_all;
use futures::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub async fn measure_download<T: Transport>(
    transport: &T,
    config: &TestConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressCallback,
) -> Result<ThroughputResult, SpeedTestError> {
    warm_up(transport, config, cancel).await?;

    info!(
        "Running download test: {} streams for {:?}",
        config.download_streams, config.download_duration
    );

    let phase = cancel.child_token();
    let ledger = ByteLedger::new();
    let started = Instant::now();
    let timing = SamplerTiming {
        direction: BandwidthDirection::Download,
        duration: config.download_duration,
        cadence: config.sample_interval,
    };

    let workers = (0..config.download_streams).map(|id| {
        stream_worker(
            transport,
            id,
            config.download_object_bytes,
            config.worker_backoff,
            &ledger,
            &phase,
        )
    });

    let (_, samples) = tokio::join!(
        join_all(workers),
        run_sampler(timing, started, &phase, progress, |now| {
            ledger.rate_mbps(now, started, config.sample_window)
        })
    );

    if cancel.is_cancelled() {
        return Err(SpeedTestError::cancelled());
    }

    let result = ThroughputResult::from_samples(samples);
    info!(
        "Download: {:.1} Mbps from {} samples",
        result.speed_mbps,
        result.samples.len()
    );

    Ok(result)
}

/// One discarded transfer to open connections before measuring.
///
/// Only cancellation is an error; anything else is logged and the phase
/// proceeds.
async fn warm_up<T: Transport>(
    transport: &T,
    config: &TestConfig,
    cancel: &CancellationToken,
) -> Result<(), SpeedTestError> {
    if config.download_warmup_bytes == 0 {
        return Ok(());
    }

    debug!("Download warm-up: {} bytes", config.download_warmup_bytes);

    let result = retry_async(
        &config.retry_config,
        "download warm-up",
        cancel,
        || async move {
            let body =
                open(transport, config.download_warmup_bytes, cancel).await?;
            drain(body, cancel, |_| {}).await
        },
    )
    .await;

    match result {
        RetryResult::Success(()) => Ok(()),
        RetryResult::Cancelled => Err(SpeedTestError::cancelled()),
        RetryResult::Failed { last_error, attempts } => {
            warn!(
                "Download warm-up failed after {} attempts, measuring \
                 anyway: {}",
                attempts, last_error.message
            );
            Ok(())
        }
    }
}

async fn stream_worker<T: Transport>(
    transport: &T,
    id: usize,
    bytes: u64,
    backoff: Duration,
    ledger: &ByteLedger,
    phase: &CancellationToken,
) {
    let mut requests = 0usize;

    while !phase.is_cancelled() {
        requests += 1;

        let outcome = match open(transport, bytes, phase).await {
            Ok(body) => {
                drain(body, phase, |len| {
                    ledger.record(Instant::now(), len as u64)
                })
                .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                debug!("Download stream {} request failed: {}", id, e.message);
                if cancellable_sleep(phase, backoff).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Download stream {} finished after {} requests", id, requests);
}

async fn open<T: Transport>(
    transport: &T,
    bytes: u64,
    cancel: &CancellationToken,
) -> Result<ByteStream, SpeedTestError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SpeedTestError::cancelled()),
        body = transport.download(bytes) => body,
    }
}

/// Read `body` to the end, reporting each chunk's length to `on_chunk`.
async fn drain<F>(
    mut body: ByteStream,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> Result<(), SpeedTestError>
where
    F: FnMut(usize),
{
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(SpeedTestError::cancelled()),
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(chunk)) => on_chunk(chunk.len()),
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::fake::FakeTransport;
    use crate::progress::{NoopProgress, ProgressEvent};
    use crate::retry::RetryConfig;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    fn config(streams: usize) -> TestConfig {
        TestConfig {
            download_duration: Duration::from_secs(2),
            download_streams: streams,
            download_object_bytes: 5_000_000,
            download_warmup_bytes: 250_000,
            retry_config: RetryConfig::new(1, 10, 10),
            ..TestConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_rate_reports_that_rate() {
        // 125 KB every 10 ms is 100 Mbps
        let transport = FakeTransport::new()
            .with_download_chunks(125_000, Duration::from_millis(10));
        let cancel = CancellationToken::new();

        let result =
            measure_download(&transport, &config(1), &cancel, &NoopProgress)
                .await
                .unwrap();

        assert!(
            (result.speed_mbps - 100.0).abs() <= 5.0,
            "speed was {}",
            result.speed_mbps
        );
        assert_eq!(result.samples.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_add_up() {
        let transport = FakeTransport::new()
            .with_download_chunks(125_000, Duration::from_millis(10));
        let cancel = CancellationToken::new();

        let result =
            measure_download(&transport, &config(3), &cancel, &NoopProgress)
                .await
                .unwrap();

        assert!(
            (result.speed_mbps - 300.0).abs() <= 15.0,
            "speed was {}",
            result.speed_mbps
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_requests_are_replaced() {
        // The warm-up exhausts its retries, then one worker request fails
        let transport = FakeTransport::new()
            .with_download_chunks(125_000, Duration::from_millis(10))
            .with_failing_downloads(3);
        let cancel = CancellationToken::new();

        let result =
            measure_download(&transport, &config(1), &cancel, &NoopProgress)
                .await
                .unwrap();

        assert!(result.speed_mbps > 0.0);
        assert!(transport.downloads.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_live_samples() {
        let transport = FakeTransport::new();
        let cancel = CancellationToken::new();
        let events = Mutex::new(Vec::new());
        let progress =
            |event: ProgressEvent| events.lock().unwrap().push(event);

        let result =
            measure_download(&transport, &config(1), &cancel, &progress)
                .await
                .unwrap();

        let live: Vec<f64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::SpeedSample {
                    direction: BandwidthDirection::Download,
                    speed_mbps,
                } => Some(*speed_mbps),
                _ => None,
            })
            .collect();

        assert_eq!(live, result.samples);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_all_streams() {
        let transport = FakeTransport::new();
        let cancel = CancellationToken::new();
        let config = config(4);
        let begin = Instant::now();

        let (result, _) = tokio::join!(
            measure_download(&transport, &config, &cancel, &NoopProgress),
            async {
                tokio::time::sleep(Duration::from_millis(700)).await;
                cancel.cancel();
            }
        );

        assert!(result.unwrap_err().is_cancelled());
        assert!(begin.elapsed() < Duration::from_millis(750));
    }
}
