//! Retrying HTTP client.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::{TransportError, is_transient};

/// Returns `true` for methods that may be safely repeated.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Returns `true` for statuses that warrant another attempt.
pub fn is_retriable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

/// Pooled HTTP client with a bounded retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpClient {
    /// Builds a client with its own connection pool.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.pool.connect_timeout)
            .pool_idle_timeout(config.pool.idle_timeout)
            .pool_max_idle_per_host(config.pool.max_idle_per_host)
            .tcp_keepalive(config.pool.tcp_keepalive);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(TransportError::Build)?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Executes a request, retrying idempotent methods on transient failures.
    ///
    /// `build` is invoked once per attempt with a fresh builder for
    /// `method url` and must attach headers, query and a new copy of the body.
    /// Non-idempotent methods (POST, PATCH) are sent exactly once.
    ///
    /// Responses with a non-retriable status are returned as-is; interpreting
    /// them is the caller's job.
    pub async fn execute<F>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        mut build: F,
    ) -> Result<Response, TransportError>
    where
        F: FnMut(RequestBuilder) -> RequestBuilder,
    {
        if !is_idempotent(&method) {
            let request = build(self.http.request(method, url));
            return self.attempt(cancel, request).await;
        }

        let mut backoff = Backoff::new(&self.config.backoff, self.config.max_elapsed);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let request = build(self.http.request(method.clone(), url));

            let last = match self.attempt(cancel, request).await {
                Ok(resp) if is_retriable_status(resp.status()) => {
                    let status = resp.status().as_u16();
                    // Drain so the connection returns to the pool.
                    let _ = resp.bytes().await;
                    TransportError::RetriableStatus(status)
                }
                Ok(resp) => return Ok(resp),
                Err(TransportError::Http(e)) if is_transient(&e) => TransportError::Http(e),
                Err(e) => return Err(e),
            };

            if attempts > self.config.max_retries {
                return Err(TransportError::RetriesExhausted {
                    attempts,
                    last: Box::new(last),
                });
            }
            let Some(delay) = backoff.next() else {
                return Err(TransportError::RetriesExhausted {
                    attempts,
                    last: Box::new(last),
                });
            };

            warn!(
                %method,
                url,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last,
                "transient failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Sends one attempt, racing it against cancellation.
    async fn attempt(
        &self,
        cancel: &CancellationToken,
        request: RequestBuilder,
    ) -> Result<Response, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("request aborted by cancellation");
                Err(TransportError::Cancelled)
            }
            result = request.send() => result.map_err(TransportError::Http),
        }
    }
}
