//! Presigned-URL chunked multipart upload.
//!
//! Parts are sent sequentially with `PUT`. Each part is read into a buffer
//! bounded by the chunk size so a failed attempt can be replayed by the
//! transport; progress rewinds to the part start on every attempt.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use multiuploader_transfer::{
    CountingReader, PartSpan, SpeedCalculator, UploadProgress, read_part,
};
use multiuploader_transport::{HttpClient, Method};
use reqwest::Body;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProviderError, ResultExt};
use crate::provider::{BoxFuture, UploadSource};

/// Resolves the upload URL of a part.
pub(crate) trait PartUrls: Send + Sync {
    fn part_url<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        number: u32,
    ) -> BoxFuture<'a, Result<String, ProviderError>>;
}

/// A part accepted by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletedPart {
    pub number: u32,
    pub etag: String,
}

/// Parameters of one chunked upload.
pub(crate) struct ChunkedUpload<'a> {
    pub transport: &'a HttpClient,
    pub size: u64,
    pub chunk_size: u64,
    pub total_parts: u32,
    /// Bytes between two progress events.
    pub progress_step: u64,
    pub content_type: Option<&'static str>,
}

impl ChunkedUpload<'_> {
    /// Uploads parts `1..=total_parts` in order and returns their ETags.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn UploadSource,
        urls: &dyn PartUrls,
        progress: mpsc::Sender<UploadProgress>,
    ) -> Result<Vec<CompletedPart>, ProviderError> {
        let tracker = Arc::new(Mutex::new(ChunkProgress::new(
            self.size,
            self.progress_step,
            progress,
        )));
        let mut parts = Vec::with_capacity(self.total_parts as usize);

        for number in 1..=self.total_parts {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            let span = PartSpan::nth(number, self.chunk_size, self.size)
                .with_context(|| format!("failed to seek to part {number}"))?;
            let data: Arc<[u8]> = read_part(&mut *source, span)
                .await
                .with_context(|| format!("failed to read part {number}"))?
                .into();

            let url = urls
                .part_url(cancel, number)
                .await
                .with_context(|| format!("failed to get URL for part {number}"))?;

            let etag = self
                .put_part(cancel, &url, span, data, &tracker)
                .await
                .with_context(|| format!("failed to upload part {number}"))?;

            debug!(part = number, bytes = span.len, %etag, "part uploaded");
            parts.push(CompletedPart { number, etag });
        }

        Ok(parts)
    }

    async fn put_part(
        &self,
        cancel: &CancellationToken,
        url: &str,
        span: PartSpan,
        data: Arc<[u8]>,
        tracker: &Arc<Mutex<ChunkProgress>>,
    ) -> Result<String, ProviderError> {
        let content_type = self.content_type;
        let response = self
            .transport
            .execute(cancel, Method::PUT, url, |req| {
                if let Ok(mut t) = tracker.lock() {
                    t.rewind(span.start);
                }
                let state = Arc::clone(tracker);
                let reader = CountingReader::new(Cursor::new(Arc::clone(&data)), move |n| {
                    if let Ok(mut t) = state.lock() {
                        t.advance(n);
                    }
                });
                let req = req
                    .header(CONTENT_LENGTH, span.len)
                    .body(Body::wrap_stream(ReaderStream::new(reader)));
                match content_type {
                    Some(ct) => req.header(CONTENT_TYPE, ct),
                    None => req,
                }
            })
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(ProviderError::Rejected(format!(
                "upload failed with status {}",
                status.as_u16()
            )));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(etag.trim_matches('"').to_string())
    }
}

/// Running progress across all parts of one upload.
struct ChunkProgress {
    total: u64,
    uploaded: u64,
    last_emitted: u64,
    step: u64,
    speed: SpeedCalculator,
    tx: mpsc::Sender<UploadProgress>,
}

impl ChunkProgress {
    fn new(total: u64, step: u64, tx: mpsc::Sender<UploadProgress>) -> Self {
        Self {
            total,
            uploaded: 0,
            last_emitted: 0,
            step: step.max(1),
            speed: SpeedCalculator::new(),
            tx,
        }
    }

    fn advance(&mut self, n: u64) {
        self.uploaded += n;
        if self.uploaded - self.last_emitted >= self.step || self.uploaded == self.total {
            self.last_emitted = self.uploaded;
            let speed = self.speed.update(self.uploaded);
            let _ = self
                .tx
                .try_send(UploadProgress::new(self.uploaded, self.total, speed));
        }
    }

    /// Resets the running total to `offset` before a part (re)starts.
    fn rewind(&mut self, offset: u64) {
        self.uploaded = offset;
        self.last_emitted = self.last_emitted.min(offset);
    }
}
