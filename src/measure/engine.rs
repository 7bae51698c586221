use crate::echo::Transport;
use crate::errors::SpeedTestError;
use crate::gauge::Gauge;
use crate::measure::download::measure_download;
use crate::measure::ping::{measure_ping, PingResult};
use crate::measure::upload::measure_upload;
use crate::measure::ThroughputResult;
use crate::progress::{
    BandwidthDirection, Phase, ProgressCallback, ProgressEvent,
};
use crate::retry::{cancellable_sleep, RetryConfig};
use log::{debug, info};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for the test engine.
///
/// Every timing, size and concurrency constant of a run lives here so tests
/// can shrink a run to a few virtual seconds.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Number of sequential ping probes.
    /// Default: 20
    pub ping_count: usize,

    /// Pause between ping probes.
    /// Default: 100ms
    pub ping_delay: Duration,

    /// Wall-clock budget of the download phase.
    /// Default: 10s
    pub download_duration: Duration,

    /// Concurrent download streams.
    /// Default: 6
    pub download_streams: usize,

    /// Size of each bulk download request in bytes.
    /// Default: 25MB
    pub download_object_bytes: u64,

    /// Size of the discarded warm-up download; 0 skips it.
    /// Default: 1MB
    pub download_warmup_bytes: u64,

    /// Wall-clock budget of the upload phase.
    /// Default: 8s
    pub upload_duration: Duration,

    /// Concurrent upload workers.
    /// Default: 4
    pub upload_workers: usize,

    /// Size of each upload payload in bytes.
    /// Default: 2MB
    pub upload_payload_bytes: usize,

    /// Size of the discarded warm-up upload; 0 skips it.
    /// Default: 256KB
    pub upload_warmup_bytes: usize,

    /// Cadence of live throughput samples.
    /// Default: 250ms
    pub sample_interval: Duration,

    /// Trailing window of the download rate.
    /// Default: 3000ms
    pub sample_window: Duration,

    /// Pause after a failed transfer before the worker carries on.
    /// Default: 100ms
    pub worker_backoff: Duration,

    /// Length of the gauge's animation back to zero between phases.
    /// Default: 400ms
    pub gauge_reset: Duration,

    /// Pause between the ping and download phases, after the reset.
    /// Default: 200ms
    pub after_ping_pause: Duration,

    /// Time the final download speed stays on the gauge.
    /// Default: 600ms
    pub download_hold: Duration,

    /// Pause between the download and upload phases, after the reset.
    /// Default: 500ms
    pub after_download_pause: Duration,

    /// Retry configuration for the warm-up transfers.
    /// Default: 2 retries with exponential backoff
    pub retry_config: RetryConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            ping_count: 20,
            ping_delay: Duration::from_millis(100),
            download_duration: Duration::from_secs(10),
            download_streams: 6,
            download_object_bytes: 25_000_000,
            download_warmup_bytes: 1_000_000,
            upload_duration: Duration::from_secs(8),
            upload_workers: 4,
            upload_payload_bytes: 2 * 1024 * 1024,
            upload_warmup_bytes: 256 * 1024,
            sample_interval: Duration::from_millis(250),
            sample_window: Duration::from_millis(3000),
            worker_backoff: Duration::from_millis(100),
            gauge_reset: Duration::from_millis(400),
            after_ping_pause: Duration::from_millis(200),
            download_hold: Duration::from_millis(600),
            after_download_pause: Duration::from_millis(500),
            retry_config: RetryConfig::default(),
        }
    }
}

/// Complete figures from one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub ping: PingResult,
    pub download: ThroughputResult,
    pub upload: ThroughputResult,
}

/// Runs ping, download and upload in order against one transport.
///
/// # Example
/// ```no_run
/// use speedgauge::echo::EchoClient;
/// use speedgauge::gauge::Gauge;
/// use speedgauge::measure::{TestConfig, TestEngine};
/// use speedgauge::progress::NoopProgress;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let client =
///         EchoClient::from_base("https://speed.cloudflare.com").unwrap();
///     let config = TestConfig::default();
///     let engine = TestEngine::new(&client, &config);
///     let output = engine
///         .run(&CancellationToken::new(), &NoopProgress, &Gauge::new())
///         .await
///         .unwrap();
///     println!("Download: {:.1} Mbps", output.download.speed_mbps);
/// }
/// ```
pub struct TestEngine<'a, T> {
    transport: &'a T,
    config: &'a TestConfig,
}

impl<'a, T: Transport> TestEngine<'a, T> {
    pub fn new(transport: &'a T, config: &'a TestConfig) -> Self {
        Self { transport, config }
    }

    /// Run the complete sequence.
    ///
    /// Between phases the gauge animates back to zero and the engine pauses
    /// so each phase starts from a settled needle. Every pause observes
    /// `cancel`; a cancelled run returns a cancellation error and no
    /// figures.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        progress: &dyn ProgressCallback,
        gauge: &Gauge,
    ) -> Result<EngineOutput, SpeedTestError> {
        let config = self.config;
        info!("Starting speed test sequence");

        progress.on_progress(ProgressEvent::PhaseChange(Phase::Ping));
        let ping = measure_ping(
            self.transport,
            config.ping_count,
            config.ping_delay,
            cancel,
            progress,
        )
        .await?;
        progress.on_progress(ProgressEvent::LatencyComplete {
            ping_ms: ping.ping_ms,
            jitter_ms: ping.jitter_ms,
        });

        gauge.reset(config.gauge_reset);
        cancellable_sleep(cancel, config.gauge_reset + config.after_ping_pause)
            .await?;

        progress.on_progress(ProgressEvent::PhaseChange(Phase::Download));
        let download =
            measure_download(self.transport, config, cancel, progress).await?;
        progress.on_progress(ProgressEvent::BandwidthComplete {
            direction: BandwidthDirection::Download,
            speed_mbps: download.speed_mbps,
        });

        debug!("Holding download result on the gauge");
        gauge.set_target(download.speed_mbps);
        cancellable_sleep(cancel, config.download_hold).await?;
        gauge.reset(config.gauge_reset);
        cancellable_sleep(
            cancel,
            config.gauge_reset + config.after_download_pause,
        )
        .await?;

        progress.on_progress(ProgressEvent::PhaseChange(Phase::Upload));
        let upload =
            measure_upload(self.transport, config, cancel, progress).await?;
        progress.on_progress(ProgressEvent::BandwidthComplete {
            direction: BandwidthDirection::Upload,
            speed_mbps: upload.speed_mbps,
        });

        info!(
            "Speed test complete: download={:.1} Mbps, upload={:.1} Mbps",
            download.speed_mbps, upload.speed_mbps
        );

        Ok(EngineOutput { ping, download, upload })
    }
}
