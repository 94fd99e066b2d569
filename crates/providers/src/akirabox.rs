//! AkiraBox backend (presigned chunked multipart).

use multiuploader_transfer::{DEFAULT_PROGRESS_STEP, UploadProgress, UploadResult};
use multiuploader_transport::{Method, TransportError, Transports};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ProviderError, ResultExt};
use crate::presigned::{ChunkedUpload, CompletedPart, PartUrls};
use crate::provider::{BoxFuture, Provider, UploadSource, join_url, require_key};

pub const AKIRABOX_BASE_URL: &str = "https://akirabox.com";

#[derive(Debug, Clone)]
pub struct AkiraBoxConfig {
    pub base_url: String,
    pub progress_step: u64,
}

impl Default for AkiraBoxConfig {
    fn default() -> Self {
        Self {
            base_url: AKIRABOX_BASE_URL.to_string(),
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    upload_id: String,
    key: String,
    provider_id: i64,
    chunk_size: u64,
    total_chunks: u32,
    /// Opaque value echoed back on completion.
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChunkUrlResponse {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CompletePart {
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MultipartUpload {
    parts: Vec<CompletePart>,
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    #[serde(rename = "UploadId")]
    upload_id: &'a str,
    #[serde(rename = "MultipartUpload")]
    multipart_upload: MultipartUpload,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CompleteResponse {
    #[serde(default)]
    download_link: Option<String>,
}

pub struct AkiraBox {
    api_token: String,
    transports: Transports,
    config: AkiraBoxConfig,
}

impl AkiraBox {
    pub fn new(api_token: impl Into<String>, transports: Transports) -> Self {
        Self::with_config(api_token, transports, AkiraBoxConfig::default())
    }

    pub fn with_config(
        api_token: impl Into<String>,
        transports: Transports,
        config: AkiraBoxConfig,
    ) -> Self {
        Self {
            api_token: api_token.into(),
            transports,
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    async fn start_upload(
        &self,
        cancel: &CancellationToken,
        filename: &str,
        size: u64,
    ) -> Result<StartResponse, ProviderError> {
        let url = self.endpoint("api/upload/start");
        let size = size.to_string();
        let resp = self
            .transports
            .default
            .execute(cancel, Method::POST, &url, |req| {
                req.header(ACCEPT, "application/json").query(&[
                    ("api_token", self.api_token.as_str()),
                    ("file", filename),
                    ("fileSize", size.as_str()),
                ])
            })
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ProviderError::Rejected(format!(
                "start upload failed with status {status}"
            )));
        }
        let body = resp.bytes().await.map_err(TransportError::from)?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn complete_upload(
        &self,
        cancel: &CancellationToken,
        start: &StartResponse,
        parts: Vec<CompletedPart>,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint("api/upload/complete");
        let provider_id = start.provider_id.to_string();
        let payload = serde_json::to_vec(&CompleteRequest {
            upload_id: &start.upload_id,
            multipart_upload: MultipartUpload {
                parts: parts
                    .into_iter()
                    .map(|p| CompletePart {
                        part_number: p.number,
                        etag: p.etag,
                    })
                    .collect(),
            },
            metadata: &start.metadata,
        })?;

        let resp = self
            .transports
            .default
            .execute(cancel, Method::POST, &url, |req| {
                req.query(&[
                    ("api_token", self.api_token.as_str()),
                    ("key", start.key.as_str()),
                    ("providerId", provider_id.as_str()),
                ])
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone())
            })
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ProviderError::Rejected(format!(
                "complete upload failed with status {status}"
            )));
        }
        let body = resp.bytes().await.map_err(TransportError::from)?;
        let parsed: CompleteResponse = serde_json::from_slice(&body)?;
        parsed
            .download_link
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ProviderError::Rejected("download_link not found in response".into()))
    }
}

/// Fetches one presigned URL per part from `/api/upload/chunk-url`.
struct ChunkUrls<'a> {
    provider: &'a AkiraBox,
    start: &'a StartResponse,
}

impl PartUrls for ChunkUrls<'_> {
    fn part_url<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        number: u32,
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let url = self.provider.endpoint("api/upload/chunk-url");
            let part = number.to_string();
            let provider_id = self.start.provider_id.to_string();
            let resp = self
                .provider
                .transports
                .default
                .execute(cancel, Method::GET, &url, |req| {
                    req.header(ACCEPT, "application/json").query(&[
                        ("api_token", self.provider.api_token.as_str()),
                        ("uploadId", self.start.upload_id.as_str()),
                        ("part-number", part.as_str()),
                        ("key", self.start.key.as_str()),
                        ("providerId", provider_id.as_str()),
                    ])
                })
                .await?;

            let status = resp.status().as_u16();
            if status != 200 {
                return Err(ProviderError::Rejected(format!(
                    "get chunk URL failed with status {status}"
                )));
            }
            let body = resp.bytes().await.map_err(TransportError::from)?;
            let parsed: ChunkUrlResponse = serde_json::from_slice(&body)?;
            Ok(parsed.url)
        })
    }
}

impl Provider for AkiraBox {
    fn name(&self) -> &str {
        "AkiraBox"
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn validate_key(&self, key: &str) -> Result<(), ProviderError> {
        require_key(key, "API token is required")
    }

    fn upload<'a>(
        &'a self,
        cancel: CancellationToken,
        source: &'a mut dyn UploadSource,
        filename: &'a str,
        size: u64,
        progress: mpsc::Sender<UploadProgress>,
    ) -> BoxFuture<'a, Result<UploadResult, ProviderError>> {
        Box::pin(async move {
            let start = self
                .start_upload(&cancel, filename, size)
                .await
                .context("start upload failed")?;
            debug!(
                upload_id = %start.upload_id,
                chunk_size = start.chunk_size,
                total_chunks = start.total_chunks,
                "upload started"
            );

            let urls = ChunkUrls {
                provider: self,
                start: &start,
            };
            let parts = ChunkedUpload {
                transport: &self.transports.long_lived,
                size,
                chunk_size: start.chunk_size,
                total_parts: start.total_chunks,
                progress_step: self.config.progress_step,
                content_type: Some("application/octet-stream"),
            }
            .run(&cancel, source, &urls, progress)
            .await
            .context("upload parts failed")?;

            let link = self
                .complete_upload(&cancel, &start, parts)
                .await
                .context("complete upload failed")?;

            info!(provider = "AkiraBox", url = %link, size, "upload complete");
            Ok(UploadResult {
                url: link.clone(),
                download_url: Some(link),
                ..Default::default()
            })
        })
    }
}
