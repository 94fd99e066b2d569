use std::error::Error as _;
use std::io;

/// Errors surfaced by [`HttpClient`](crate::HttpClient).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A retriable status was observed on the last attempt.
    #[error("retriable status {0}")]
    RetriableStatus(u16),

    #[error("request cancelled")]
    Cancelled,

    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Returns `true` if the failure stems from caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RetriesExhausted { last, .. } => last.is_cancelled(),
            _ => false,
        }
    }

    /// Returns `true` if the underlying failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::RetriesExhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if the server could not be reached or the connection
    /// broke mid-request.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Http(e) => is_transient(e),
            Self::RetriesExhausted { last, .. } => last.is_network(),
            _ => false,
        }
    }

    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::RetriableStatus(code) => Some(*code),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Classifies a transport-level error as worth retrying.
///
/// Timeouts, connect failures (which include DNS resolution), refused or
/// reset connections, and premature EOF are transient. Everything else
/// (invalid URLs, TLS configuration, body encoding, redirect loops) is not.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
            )
        {
            return true;
        }
        let text = cause.to_string();
        if text.contains("connection closed before message completed")
            || text.contains("unexpected end of file")
        {
            return true;
        }
        source = cause.source();
    }
    false
}
