//! The upload backend contract.

use std::future::Future;
use std::pin::Pin;

use multiuploader_transfer::{UploadProgress, UploadResult};
use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Boxed future returned by [`Provider`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Seekable byte source handed to a provider.
///
/// Implemented for every `AsyncRead + AsyncSeek` type, such as
/// `tokio::fs::File` and `std::io::Cursor<Vec<u8>>`.
pub trait UploadSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> UploadSource for T {}

/// A file-hosting backend.
///
/// Implementations hold only their credential, configuration and shared
/// transport handles; every call to [`upload`](Self::upload) is independent.
pub trait Provider: Send + Sync {
    /// Display name, also used as the settings key.
    fn name(&self) -> &str;

    /// Whether an API key must be configured before uploading.
    fn requires_auth(&self) -> bool;

    /// Checks the shape of a credential without contacting the service.
    fn validate_key(&self, key: &str) -> Result<(), ProviderError>;

    /// Uploads `size` bytes from `source` under `filename`.
    ///
    /// Progress snapshots are pushed with `try_send`; a full channel drops
    /// the sample. Cancelling `cancel` aborts the transfer with
    /// [`ProviderError::Cancelled`].
    fn upload<'a>(
        &'a self,
        cancel: CancellationToken,
        source: &'a mut dyn UploadSource,
        filename: &'a str,
        size: u64,
        progress: mpsc::Sender<UploadProgress>,
    ) -> BoxFuture<'a, Result<UploadResult, ProviderError>>;
}

/// Rejects an empty credential with `message`.
pub(crate) fn require_key(key: &str, message: &str) -> Result<(), ProviderError> {
    if key.trim().is_empty() {
        return Err(ProviderError::InvalidKey(message.to_string()));
    }
    Ok(())
}

/// Joins a base URL and a path segment with exactly one slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://a.b/", "x"), "https://a.b/x");
        assert_eq!(join_url("https://a.b", "/api/x"), "https://a.b/api/x");
        assert_eq!(join_url("https://a.b", "abc123"), "https://a.b/abc123");
    }

    #[test]
    fn require_key_rejects_blank() {
        assert!(require_key("", "API key is required").is_err());
        assert!(require_key("   ", "API key is required").is_err());
        assert!(require_key("k", "API key is required").is_ok());
        let err = require_key("", "API token is required").unwrap_err();
        assert_eq!(err.to_string(), "API token is required");
    }

    #[test]
    fn sources_are_object_safe() {
        fn takes(_: &mut dyn UploadSource) {}
        let mut cursor = std::io::Cursor::new(vec![1u8, 2, 3]);
        takes(&mut cursor);
    }
}
