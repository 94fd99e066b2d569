//! Terminal front end for the upload controller.

use std::io::Write;
use std::sync::Mutex;

use multiuploader_session::{Notifier, ProgressView, UploadObserver, UploadOutcome};
use tokio::sync::oneshot;

/// Draws a single progress line on stderr and hands the outcome back to
/// `main`.
pub struct ConsoleObserver {
    done: Mutex<Option<oneshot::Sender<UploadOutcome>>>,
}

impl ConsoleObserver {
    pub fn new() -> (Self, oneshot::Receiver<UploadOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                done: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

/// `"  42% Uploaded: 1.00 MB / 2.38 MB  Speed: 512.0 KB/s  ETA: ~3s"`
pub fn progress_line(view: &ProgressView) -> String {
    format!(
        "{:>4.0}% {}  {}  {}",
        view.fraction * 100.0,
        view.uploaded,
        view.speed,
        view.eta
    )
}

impl UploadObserver for ConsoleObserver {
    fn on_progress(&self, view: &ProgressView) {
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[2K{}", progress_line(view));
        let _ = err.flush();
    }

    fn on_finished(&self, outcome: &UploadOutcome) {
        eprintln!();
        if let Ok(mut done) = self.done.lock()
            && let Some(tx) = done.take()
        {
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Prints notifications to stderr.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, body: &str) {
        eprintln!("[{title}] {body}");
    }
}
