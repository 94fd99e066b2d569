use serde::{Deserialize, Serialize};

use crate::progress::percentage;

/// Point-in-time snapshot of an upload in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    /// Smoothed transfer rate in bytes/second.
    pub speed: f64,
    /// Completion in whole percent, clamped to 0..=100.
    pub percentage: u8,
}

impl UploadProgress {
    /// Builds a snapshot, deriving the percentage from the byte counts.
    pub fn new(bytes_uploaded: u64, total_bytes: u64, speed: f64) -> Self {
        Self {
            bytes_uploaded,
            total_bytes,
            speed,
            percentage: percentage(bytes_uploaded, total_bytes),
        }
    }

    /// Snapshot reporting the whole file as transferred.
    pub fn finished(total_bytes: u64, speed: f64) -> Self {
        Self {
            bytes_uploaded: total_bytes,
            total_bytes,
            speed,
            percentage: 100,
        }
    }

    /// Bytes still to transfer.
    pub fn remaining(&self) -> u64 {
        self.total_bytes.saturating_sub(self.bytes_uploaded)
    }

    /// Completion as a fraction in 0.0..=1.0.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_uploaded as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Public page for the file.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadResult {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Labelled, non-empty links suitable for copy actions.
    pub fn links(&self) -> Vec<(&'static str, &str)> {
        let mut links = Vec::with_capacity(3);
        if !self.url.is_empty() {
            links.push(("URL", self.url.as_str()));
        }
        if let Some(url) = self.download_url.as_deref().filter(|u| !u.is_empty()) {
            links.push(("Download URL", url));
        }
        if let Some(url) = self.delete_url.as_deref().filter(|u| !u.is_empty()) {
            links.push(("Delete URL", url));
        }
        links
    }
}
