//! Rootz backend.
//!
//! Files below the multipart threshold go out as one buffered multipart
//! POST. Larger files use the presigned multipart flow:
//! `init` → `batch-urls` → part `PUT`s → `complete`.

use std::collections::HashMap;
use std::io::SeekFrom;

use multiuploader_transfer::{DEFAULT_PROGRESS_STEP, UploadProgress, UploadResult};
use multiuploader_transport::{HttpClient, Method, TransportError, Transports};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ProviderError, ResultExt};
use crate::presigned::{ChunkedUpload, PartUrls};
use crate::provider::{BoxFuture, Provider, UploadSource, join_url, require_key};

pub const ROOTZ_BASE_URL: &str = "https://www.rootz.so";

/// Files at or above this size use the multipart flow.
pub const ROOTZ_MULTIPART_THRESHOLD: u64 = 4 * 1024 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct RootzConfig {
    pub base_url: String,
    pub multipart_threshold: u64,
    /// Bytes between two progress events during part uploads.
    pub progress_step: u64,
}

impl Default for RootzConfig {
    fn default() -> Self {
        Self {
            base_url: ROOTZ_BASE_URL.to_string(),
            multipart_threshold: ROOTZ_MULTIPART_THRESHOLD,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SimpleUploadResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ShortIdData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortIdData {
    short_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    file_name: &'a str,
    file_size: u64,
    file_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    upload_id: String,
    key: String,
    chunk_size: u64,
    total_parts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUrlsRequest<'a> {
    key: &'a str,
    upload_id: &'a str,
    total_parts: u32,
}

#[derive(Debug, Deserialize)]
struct BatchUrlsResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletePart {
    part_number: u32,
    etag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    key: &'a str,
    upload_id: &'a str,
    parts: Vec<CompletePart>,
    file_name: &'a str,
    file_size: u64,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompleteResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    file: Option<ShortIdData>,
}

/// Presigned URLs handed out by `batch-urls`, keyed by part number.
struct BatchUrls(HashMap<String, String>);

impl PartUrls for BatchUrls {
    fn part_url<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        number: u32,
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        let url = self
            .0
            .get(&number.to_string())
            .cloned()
            .ok_or_else(|| ProviderError::Rejected(format!("no upload URL for part {number}")));
        Box::pin(async move { url })
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct Rootz {
    api_key: String,
    transports: Transports,
    config: RootzConfig,
}

impl Rootz {
    pub fn new(api_key: impl Into<String>, transports: Transports) -> Self {
        Self::with_config(api_key, transports, RootzConfig::default())
    }

    pub fn with_config(
        api_key: impl Into<String>,
        transports: Transports,
        config: RootzConfig,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            transports,
            config,
        }
    }

    fn file_url(&self, short_id: &str) -> String {
        join_url(&self.config.base_url, &format!("d/{short_id}"))
    }

    async fn upload_small(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn UploadSource,
        filename: &str,
        size: u64,
        progress: &mpsc::Sender<UploadProgress>,
    ) -> Result<UploadResult, ProviderError> {
        source.seek(SeekFrom::Start(0)).await?;
        let mut data = Vec::with_capacity(size as usize);
        source
            .read_to_end(&mut data)
            .await
            .context("failed to read file")?;

        let len = data.len() as u64;
        let file = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(OCTET_STREAM)
            .map_err(TransportError::from)?;
        let mut form = Some(Form::new().part("file", file));
        let url = join_url(&self.config.base_url, "api/files/upload");

        let resp = self
            .transports
            .long_lived
            .execute(cancel, Method::POST, &url, |req| {
                let req = match form.take() {
                    Some(form) => req.multipart(form),
                    None => req,
                };
                self.authorize(req)
            })
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ProviderError::Rejected(format!(
                "upload failed with status {status}"
            )));
        }
        let parsed: SimpleUploadResponse = read_json(resp).await?;
        if !parsed.success {
            return Err(ProviderError::Rejected(format!(
                "upload failed: {}",
                parsed.error.unwrap_or_default()
            )));
        }
        let short_id = parsed
            .data
            .map(|d| d.short_id)
            .ok_or_else(|| ProviderError::Rejected("upload response has no shortId".into()))?;

        let _ = progress.try_send(UploadProgress::finished(len, 0.0));
        Ok(UploadResult {
            url: self.file_url(&short_id),
            file_id: Some(short_id),
            ..Default::default()
        })
    }

    async fn upload_multipart(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn UploadSource,
        filename: &str,
        size: u64,
        progress: mpsc::Sender<UploadProgress>,
    ) -> Result<UploadResult, ProviderError> {
        let init: InitResponse = self
            .post_json(
                &self.transports.default,
                cancel,
                "api/files/multipart/init",
                &InitRequest {
                    file_name: filename,
                    file_size: size,
                    file_type: OCTET_STREAM,
                },
                true,
            )
            .await
            .context("init failed")?;
        debug!(
            upload_id = %init.upload_id,
            chunk_size = init.chunk_size,
            total_parts = init.total_parts,
            "multipart upload initialised"
        );

        let batch: BatchUrlsResponse = self
            .post_json(
                &self.transports.default,
                cancel,
                "api/files/multipart/batch-urls",
                &BatchUrlsRequest {
                    key: &init.key,
                    upload_id: &init.upload_id,
                    total_parts: init.total_parts,
                },
                false,
            )
            .await
            .context("failed to get URLs")?;
        if !batch.success {
            return Err(ProviderError::Rejected(format!(
                "failed to get URLs: {}",
                batch.error.as_deref().unwrap_or("unknown error")
            )));
        }

        let parts = ChunkedUpload {
            transport: &self.transports.long_lived,
            size,
            chunk_size: init.chunk_size,
            total_parts: init.total_parts,
            progress_step: self.config.progress_step,
            content_type: None,
        }
        .run(cancel, source, &BatchUrls(batch.urls), progress)
        .await
        .context("upload parts failed")?;

        let complete: CompleteResponse = self
            .post_json(
                &self.transports.default,
                cancel,
                "api/files/multipart/complete",
                &CompleteRequest {
                    key: &init.key,
                    upload_id: &init.upload_id,
                    parts: parts
                        .into_iter()
                        .map(|p| CompletePart {
                            part_number: p.number,
                            etag: p.etag,
                        })
                        .collect(),
                    file_name: filename,
                    file_size: size,
                    content_type: OCTET_STREAM,
                },
                true,
            )
            .await
            .context("complete failed")?;
        if !complete.success {
            return Err(ProviderError::Rejected(format!(
                "complete failed: {}",
                complete.error.as_deref().unwrap_or("unknown error")
            )));
        }
        let short_id = complete
            .file
            .map(|f| f.short_id)
            .ok_or_else(|| ProviderError::Rejected("complete response has no shortId".into()))?;

        Ok(UploadResult {
            url: self.file_url(&short_id),
            file_id: Some(short_id),
            ..Default::default()
        })
    }

    /// POSTs a JSON body and decodes a JSON reply.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        client: &HttpClient,
        cancel: &CancellationToken,
        path: &str,
        body: &B,
        auth: bool,
    ) -> Result<T, ProviderError> {
        let url = join_url(&self.config.base_url, path);
        let payload = serde_json::to_vec(body)?;
        let resp = client
            .execute(cancel, Method::POST, &url, |req| {
                let req = req
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone());
                if auth { self.authorize(req) } else { req }
            })
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ProviderError::Rejected(format!(
                "request failed with status {status}"
            )));
        }
        read_json(resp).await
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header(AUTHORIZATION, format!("Bearer {}", self.api_key))
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ProviderError> {
    let body = resp.bytes().await.map_err(TransportError::from)?;
    Ok(serde_json::from_slice(&body)?)
}

impl Provider for Rootz {
    fn name(&self) -> &str {
        "Rootz"
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn validate_key(&self, key: &str) -> Result<(), ProviderError> {
        require_key(key, "API key is required")
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
            let result = if size < self.config.multipart_threshold {
                self.upload_small(&cancel, source, filename, size, &progress)
                    .await?
            } else {
                self.upload_multipart(&cancel, source, filename, size, progress)
                    .await?
            };
            info!(provider = "Rootz", url = %result.url, size, "upload complete");
            Ok(result)
        })
    }
}
