//! Upload throughput over parallel POST loops.
//!
//! Each worker posts fresh random payloads back to back. A payload counts
//! toward the shared total only once its POST has completed, so the ticker
//! reports the rate between consecutive reads of that total.

use crate::echo::Transport;
use crate::errors::SpeedTestError;
use crate::measure::engine::TestConfig;
use crate::measure::ledger::{IntervalRate, TransferCounter};
use crate::measure::payload::random_payload;
use crate::measure::{run_sampler, SamplerTiming, ThroughputResult};
use crate::progress::{BandwidthDirection, ProgressCallback};
use crate::retry::{cancellable_sleep, retry_async, RetryResult};
use bytes::Bytes;
use futures::future::join_all;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub async fn measure_upload<T: Transport>(
    transport: &T,
    config: &TestConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressCallback,
) -> Result<ThroughputResult, SpeedTestError> {
    warm_up(transport, config, cancel).await?;

    info!(
        "Running upload test: {} workers for {:?}",
        config.upload_workers, config.upload_duration
    );

    let phase = cancel.child_token();
    let counter = TransferCounter::new();
    let started = Instant::now();
    let mut interval = IntervalRate::new(started);
    let timing = SamplerTiming {
        direction: BandwidthDirection::Upload,
        duration: config.upload_duration,
        cadence: config.sample_interval,
    };

    let workers = (0..config.upload_workers).map(|id| {
        post_worker(
            transport,
            id,
            config.upload_payload_bytes,
            config.worker_backoff,
            &counter,
            &phase,
        )
    });

    let (_, samples) = tokio::join!(
        join_all(workers),
        run_sampler(timing, started, &phase, progress, |now| {
            interval.sample(counter.total(), now)
        })
    );

    if cancel.is_cancelled() {
        return Err(SpeedTestError::cancelled());
    }

    let result = ThroughputResult::from_samples(samples);
    info!(
        "Upload: {:.1} Mbps from {} samples",
        result.speed_mbps,
        result.samples.len()
    );

    Ok(result)
}

async fn warm_up<T: Transport>(
    transport: &T,
    config: &TestConfig,
    cancel: &CancellationToken,
) -> Result<(), SpeedTestError> {
    if config.upload_warmup_bytes == 0 {
        return Ok(());
    }

    debug!("Upload warm-up: {} bytes", config.upload_warmup_bytes);

    let result = retry_async(
        &config.retry_config,
        "upload warm-up",
        cancel,
        || async move {
            let payload = random_payload(config.upload_warmup_bytes)?;
            post(transport, payload, cancel).await
        },
    )
    .await;

    match result {
        RetryResult::Success(()) => Ok(()),
        RetryResult::Cancelled => Err(SpeedTestError::cancelled()),
        RetryResult::Failed { last_error, attempts } => {
            warn!(
                "Upload warm-up failed after {} attempts, measuring \
                 anyway: {}",
                attempts, last_error.message
            );
            Ok(())
        }
    }
}

async fn post_worker<T: Transport>(
    transport: &T,
    id: usize,
    payload_bytes: usize,
    backoff: Duration,
    counter: &TransferCounter,
    phase: &CancellationToken,
) {
    let mut completed = 0usize;

    while !phase.is_cancelled() {
        let outcome = match random_payload(payload_bytes) {
            Ok(payload) => post(transport, payload, phase).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                counter.add(payload_bytes as u64);
                completed += 1;
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                debug!("Upload worker {} request failed: {}", id, e.message);
                if cancellable_sleep(phase, backoff).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Upload worker {} finished after {} payloads", id, completed);
}

async fn post<T: Transport>(
    transport: &T,
    payload: Bytes,
    cancel: &CancellationToken,
) -> Result<(), SpeedTestError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SpeedTestError::cancelled()),
        outcome = transport.upload(payload) => outcome,
    }
}
