//! Upload sessions.
//!
//! [`UploadController`] runs a single upload against a
//! [`Provider`](multiuploader_providers::Provider), throttles progress for
//! display and reports the outcome. Failures are rewritten for end users by
//! [`make_friendly`] and announced through a [`NotificationGate`].

mod controller;
mod friendly;
mod notify;

pub use controller::{
    DEFAULT_TICK, PROGRESS_CHANNEL_CAPACITY, ProgressView, StartError, UploadController,
    UploadObserver, UploadOutcome, UploadState,
};
pub use friendly::{FriendlyError, extract_status_code, make_friendly};
pub use notify::{FocusProbe, NoWindow, NotificationGate, Notifier};
