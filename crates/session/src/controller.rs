//! Upload session controller.
//!
//! Runs one upload at a time on background tasks and hands the presentation
//! layer a throttled view of its progress:
//!
//! - the transfer task drives the [`Provider`] and sends exactly one terminal
//!   value once the source has been dropped;
//! - a consumer task keeps only the latest [`UploadProgress`];
//! - a ticker task publishes a [`ProgressView`] every tick and delivers the
//!   terminal [`UploadOutcome`] to the [`UploadObserver`].

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use multiuploader_providers::{Provider, ProviderError, UploadSource};
use multiuploader_transfer::{UploadProgress, UploadResult, format_eta, format_size, format_speed};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::friendly::{FriendlyError, make_friendly};
use crate::notify::NotificationGate;

pub const PROGRESS_CHANNEL_CAPACITY: usize = 10;
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("an upload is already in progress")]
    AlreadyUploading,

    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Display-ready progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub progress: UploadProgress,
    /// 0.0 to 1.0.
    pub fraction: f64,
    pub uploaded: String,
    pub speed: String,
    pub eta: String,
}

impl ProgressView {
    pub fn new(progress: UploadProgress, total: u64) -> Self {
        let remaining = total.saturating_sub(progress.bytes_uploaded);
        Self {
            progress,
            fraction: f64::from(progress.percentage.min(100)) / 100.0,
            uploaded: format!(
                "Uploaded: {} / {}",
                format_size(progress.bytes_uploaded),
                format_size(total)
            ),
            speed: format!("Speed: {}", format_speed(progress.speed)),
            eta: format!("ETA: {}", format_eta(remaining, progress.speed)),
        }
    }
}

/// How an upload ended.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Completed(UploadResult),
    Failed(FriendlyError),
    Cancelled(FriendlyError),
}

/// Receives updates from the controller's ticker task.
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, view: &ProgressView);

    /// Called exactly once per upload.
    fn on_finished(&self, outcome: &UploadOutcome);
}

#[derive(Debug, Default)]
struct Snapshot {
    latest: Option<UploadProgress>,
    total: u64,
}

struct Inner {
    observer: Arc<dyn UploadObserver>,
    notifications: NotificationGate,
    tick: Duration,
    state: watch::Sender<UploadState>,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Single-flight upload controller.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct UploadController {
    inner: Arc<Inner>,
}

/// Everything the ticker task needs to finish an upload.
struct Attempt {
    provider: String,
    filename: String,
    size: u64,
    cancel: CancellationToken,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl UploadController {
    pub fn new(observer: Arc<dyn UploadObserver>, notifications: NotificationGate) -> Self {
        Self::with_tick(observer, notifications, DEFAULT_TICK)
    }

    /// Like [`new`](Self::new) with a custom interval between progress
    /// publications.
    pub fn with_tick(
        observer: Arc<dyn UploadObserver>,
        notifications: NotificationGate,
        tick: Duration,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self {
            inner: Arc::new(Inner {
                observer,
                notifications,
                tick,
                state,
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> UploadState {
        *self.inner.state.borrow()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.inner.state.subscribe()
    }

    /// Starts uploading `size` bytes of `source` through `provider`.
    ///
    /// Must be called from within a Tokio runtime. Fails without side effects
    /// if an upload is already running.
    pub fn start(
        &self,
        provider: Arc<dyn Provider>,
        source: Box<dyn UploadSource>,
        filename: impl Into<String>,
        size: u64,
    ) -> Result<(), StartError> {
        let filename = filename.into();
        let cancel = CancellationToken::new();

        {
            let mut current = self
                .inner
                .cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let claimed = self.inner.state.send_if_modified(|state| {
                if *state == UploadState::Uploading {
                    return false;
                }
                *state = UploadState::Uploading;
                true
            });
            if !claimed {
                return Err(StartError::AlreadyUploading);
            }
            *current = Some(cancel.clone());
        }

        info!(provider = provider.name(), filename = %filename, size, "upload started");

        let snapshot = Arc::new(RwLock::new(Snapshot {
            latest: None,
            total: size,
        }));
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();

        let attempt = Attempt {
            provider: provider.name().to_string(),
            filename: filename.clone(),
            size,
            cancel: cancel.clone(),
            snapshot: Arc::clone(&snapshot),
        };

        tokio::spawn(async move {
            let mut source = source;
            let result = provider
                .upload(cancel, &mut *source, &filename, size, progress_tx)
                .await;
            drop(source);
            let _ = done_tx.send(result);
        });

        tokio::spawn(track_progress(progress_rx, snapshot));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.drive(attempt, done_rx).await;
        });

        Ok(())
    }

    /// Opens `path` and uploads it under its file name.
    pub async fn start_file(
        &self,
        provider: Arc<dyn Provider>,
        path: &Path,
    ) -> Result<(), StartError> {
        if self.state() == UploadState::Uploading {
            return Err(StartError::AlreadyUploading);
        }

        let open_error = |source| StartError::Open {
            path: path.display().to_string(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(open_error)?;
        let size = file.metadata().await.map_err(open_error)?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.start(provider, Box::new(file), filename, size)
    }

    /// Requests cancellation of the running upload, if any.
    pub fn cancel(&self) {
        if let Ok(current) = self.inner.cancel.lock()
            && let Some(token) = current.as_ref()
        {
            token.cancel();
        }
    }
}

/// Keeps only the newest snapshot; ends when the provider drops its sender.
async fn track_progress(
    mut rx: mpsc::Receiver<UploadProgress>,
    snapshot: Arc<RwLock<Snapshot>>,
) {
    while let Some(progress) = rx.recv().await {
        if let Ok(mut s) = snapshot.write() {
            s.latest = Some(progress);
        }
    }
}

impl Inner {
    async fn drive(
        &self,
        attempt: Attempt,
        mut done: oneshot::Receiver<Result<UploadResult, ProviderError>>,
    ) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                result = &mut done => {
                    break result.unwrap_or_else(|_| {
                        Err(ProviderError::Rejected("upload task ended unexpectedly".into()))
                    });
                }
                _ = ticker.tick() => self.publish(&attempt),
            }
        };

        self.finish(&attempt, result);
    }

    fn publish(&self, attempt: &Attempt) {
        let view = match attempt.snapshot.read() {
            Ok(s) => s.latest.map(|p| ProgressView::new(p, s.total)),
            Err(_) => None,
        };
        if let Some(view) = view {
            self.observer.on_progress(&view);
        }
    }

    fn finish(&self, attempt: &Attempt, result: Result<UploadResult, ProviderError>) {
        let (outcome, state) = match result {
            Ok(result) => {
                info!(
                    provider = %attempt.provider,
                    filename = %attempt.filename,
                    url = %result.url,
                    "upload completed"
                );
                self.notifications.send(
                    "Upload Complete",
                    &format!("{} uploaded to {}", attempt.filename, attempt.provider),
                );
                (UploadOutcome::Completed(result), UploadState::Completed)
            }
            Err(err) if err.is_cancelled() || attempt.cancel.is_cancelled() => {
                info!(
                    provider = %attempt.provider,
                    filename = %attempt.filename,
                    "upload cancelled"
                );
                (
                    UploadOutcome::Cancelled(FriendlyError::cancelled()),
                    UploadState::Cancelled,
                )
            }
            Err(err) => {
                error!(
                    provider = %attempt.provider,
                    filename = %attempt.filename,
                    size = attempt.size,
                    error = %err,
                    "upload failed"
                );
                self.notifications.send(
                    "Upload Failed",
                    &format!("{} - Check logs for details", attempt.filename),
                );
                (
                    UploadOutcome::Failed(make_friendly(&err)),
                    UploadState::Failed,
                )
            }
        };

        // Leave `Uploading` first so the observer may start the next upload.
        {
            let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            *current = None;
            self.state.send_replace(state);
        }
        self.observer.on_finished(&outcome);
    }
}
