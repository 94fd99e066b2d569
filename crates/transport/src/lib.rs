//! Resilient HTTP transport shared by every hosting backend.
//!
//! Wraps a pooled `reqwest::Client` with a per-profile timeout and a retry
//! policy that only ever repeats idempotent requests. Three profiles exist:
//! [`ClientConfig::default_profile`] for short API calls,
//! [`ClientConfig::long_lived`] for bounded binary transfers such as single
//! parts, and [`ClientConfig::streaming`] for whole files sent as one body.
//! They are bundled in [`Transports`], built once at startup and handed to
//! every provider.

mod backoff;
mod client;
mod config;
mod error;

pub use backoff::Backoff;
pub use client::{HttpClient, is_idempotent, is_retriable_status};
pub use config::{BackoffConfig, ClientConfig, PoolConfig};
pub use error::TransportError;

// Re-exported so callers can build requests without a direct reqwest import.
pub use reqwest::{Method, RequestBuilder, Response, StatusCode};

/// The shared transport profiles.
///
/// Cloning is cheap: each [`HttpClient`] wraps an `Arc`-backed connection pool.
#[derive(Debug, Clone)]
pub struct Transports {
    /// Metadata and control calls (30 s per try).
    pub default: HttpClient,
    /// Part and small-file uploads (10 min per try).
    pub long_lived: HttpClient,
    /// Whole-file streamed uploads (no deadline).
    pub streaming: HttpClient,
}

impl Transports {
    /// Builds the canonical profiles.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_configs(
            ClientConfig::default_profile(),
            ClientConfig::long_lived(),
            ClientConfig::streaming(),
        )
    }

    /// Builds the bundle from explicit configurations.
    pub fn with_configs(
        default: ClientConfig,
        long_lived: ClientConfig,
        streaming: ClientConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            default: HttpClient::new(default)?,
            long_lived: HttpClient::new(long_lived)?,
            streaming: HttpClient::new(streaming)?,
        })
    }
}
