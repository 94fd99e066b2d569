//! Simulated backend for demos and tests.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use multiuploader_transfer::{SpeedCalculator, UploadProgress, UploadResult, percentage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::provider::{BoxFuture, Provider, UploadSource, require_key};

const MIB: u64 = 1024 * 1024;
const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// Pretends to upload at a fixed rate without touching the network.
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    bytes_per_sec: u64,
    fail_at_half: bool,
    tick: Duration,
}

impl MockProvider {
    /// A provider "uploading" at `mb_per_sec` MiB/s.
    pub fn new(name: impl Into<String>, mb_per_sec: u64) -> Self {
        Self {
            name: name.into(),
            bytes_per_sec: mb_per_sec * MIB,
            fail_at_half: false,
            tick: DEFAULT_TICK,
        }
    }

    /// A 2 MiB/s provider that fails once half the file is "sent".
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail_at_half: true,
            ..Self::new(name, 2)
        }
    }

    /// Overrides the rate in bytes per second.
    pub fn with_rate(mut self, bytes_per_sec: u64) -> Self {
        self.bytes_per_sec = bytes_per_sec;
        self
    }

    /// Overrides the interval between simulated progress events.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn validate_key(&self, key: &str) -> Result<(), ProviderError> {
        require_key(key, "API key is required")?;
        if key.len() < 10 {
            return Err(ProviderError::InvalidKey(
                "API key is too short (minimum 10 characters)".into(),
            ));
        }
        Ok(())
    }

    fn upload<'a>(
        &'a self,
        cancel: CancellationToken,
        _source: &'a mut dyn UploadSource,
        filename: &'a str,
        size: u64,
        progress: mpsc::Sender<UploadProgress>,
    ) -> BoxFuture<'a, Result<UploadResult, ProviderError>> {
        Box::pin(async move {
            let mut speed = SpeedCalculator::new();
            let started = Instant::now();
            let mut ticker = tokio::time::interval(self.tick);
            ticker.tick().await;
            let mut uploaded = 0u64;

            while uploaded < size {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = ticker.tick() => {}
                }

                let expected = (self.bytes_per_sec as f64 * started.elapsed().as_secs_f64()) as u64;
                uploaded = expected.min(size);
                let pct = percentage(uploaded, size);
                let _ = progress.try_send(UploadProgress {
                    bytes_uploaded: uploaded,
                    total_bytes: size,
                    speed: speed.update(uploaded),
                    percentage: pct,
                });

                if self.fail_at_half && pct >= 50 {
                    return Err(ProviderError::Rejected(
                        "simulated upload error at 50%".into(),
                    ));
                }
            }

            let _ = progress.try_send(UploadProgress::finished(size, speed.update(size)));

            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            Ok(UploadResult {
                url: format!("https://mock.provider/{}/{filename}", self.name),
                download_url: Some(format!("https://mock.provider/download/{filename}")),
                delete_url: Some(format!("https://mock.provider/delete/{filename}")),
                file_id: Some(format!("mock-{stamp}")),
                message: Some(format!(
                    "File uploaded successfully to {} (mock)",
                    self.name
                )),
            })
        })
    }
}
