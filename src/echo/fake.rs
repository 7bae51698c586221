//! In-process echo service with scripted timings for tests.

use crate::echo::{ByteStream, Transport};
use crate::errors::SpeedTestError;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) struct FakeTransport {
    /// Scripted probe round trips; `None` makes that probe fail.
    ping_script: Mutex<VecDeque<Option<Duration>>>,
    ping_latency: Duration,
    chunk_size: usize,
    chunk_interval: Duration,
    upload_delay: Duration,
    failing_downloads: AtomicUsize,
    failing_uploads: AtomicUsize,
    pub pings: AtomicUsize,
    pub downloads: AtomicUsize,
    pub uploads: AtomicUsize,
    pub uploaded_bytes: AtomicU64,
}

impl FakeTransport {
    /// 20 ms probes, 100 Mbps per download stream, 20 ms per upload.
    pub fn new() -> Self {
        Self {
            ping_script: Mutex::new(VecDeque::new()),
            ping_latency: Duration::from_millis(20),
            chunk_size: 125_000,
            chunk_interval: Duration::from_millis(10),
            upload_delay: Duration::from_millis(20),
            failing_downloads: AtomicUsize::new(0),
            failing_uploads: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            uploaded_bytes: AtomicU64::new(0),
        }
    }

    pub fn with_ping_script(self, script: Vec<Option<Duration>>) -> Self {
        *self.ping_script.lock().unwrap() = script.into();
        self
    }

    pub fn with_download_chunks(
        mut self,
        chunk_size: usize,
        chunk_interval: Duration,
    ) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_interval = chunk_interval;
        self
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn with_failing_downloads(self, count: usize) -> Self {
        self.failing_downloads.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_failing_uploads(self, count: usize) -> Self {
        self.failing_uploads.store(count, Ordering::SeqCst);
        self
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Transport for FakeTransport {
    async fn ping(&self) -> Result<(), SpeedTestError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let scripted = self.ping_script.lock().unwrap().pop_front();

        match scripted.unwrap_or(Some(self.ping_latency)) {
            Some(latency) => {
                tokio::time::sleep(latency).await;
                Ok(())
            }
            None => Err(SpeedTestError::network("probe failed")),
        }
    }

    async fn download(&self, bytes: u64) -> Result<ByteStream, SpeedTestError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_downloads) {
            return Err(SpeedTestError::network("connection reset"));
        }

        let block = Bytes::from(vec![0u8; self.chunk_size]);
        let interval = self.chunk_interval;

        Ok(futures::stream::unfold(bytes, move |remaining| {
            let block = block.clone();
            async move {
                if remaining == 0 {
                    return None;
                }
                tokio::time::sleep(interval).await;
                let size = remaining.min(block.len() as u64);
                Some((Ok(block.slice(..size as usize)), remaining - size))
            }
        })
        .boxed())
    }

    async fn upload(&self, payload: Bytes) -> Result<(), SpeedTestError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.upload_delay).await;

        if take_failure(&self.failing_uploads) {
            return Err(SpeedTestError::api("upload sink returned 503"));
        }

        self.uploaded_bytes.fetch_add(payload.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}
