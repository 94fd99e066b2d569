//! Provider error types.

use multiuploader_transfer::TransferError;
use multiuploader_transport::TransportError;

/// Errors produced by an upload backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The credential was rejected before any network call.
    #[error("{0}")]
    InvalidKey(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(TransportError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The service answered but refused the operation.
    #[error("{0}")]
    Rejected(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Wraps the error with a description of the failed step.
    ///
    /// Cancellation is never wrapped so callers can match on it directly.
    pub fn context(self, context: impl Into<String>) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            other => Self::Context {
                context: context.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` if the error stems from caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Transport(e) => e.is_cancelled(),
            Self::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Transport(err)
        }
    }
}

/// Adds step context to fallible provider results.
pub(crate) trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, ProviderError>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, ProviderError>;
}

impl<T, E: Into<ProviderError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T, ProviderError> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, ProviderError> {
        self.map_err(|e| e.into().context(f()))
    }
}
