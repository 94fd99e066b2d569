//! DataVaults backend (session-based multipart POST, premium upload type).

use std::time::Duration;

use multiuploader_transfer::{UploadProgress, UploadResult};
use multiuploader_transport::Transports;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ProviderError;
use crate::provider::{BoxFuture, Provider, UploadSource, require_key};
use crate::session_post::{DEFAULT_PROGRESS_INTERVAL, SessionPost};

pub const DATAVAULTS_BASE_URL: &str = "https://datavaults.co/";

#[derive(Debug, Clone)]
pub struct DataVaultsConfig {
    pub base_url: String,
    pub progress_interval: Duration,
}

impl Default for DataVaultsConfig {
    fn default() -> Self {
        Self {
            base_url: DATAVAULTS_BASE_URL.to_string(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

pub struct DataVaults {
    api_key: String,
    transports: Transports,
    protocol: SessionPost,
}

impl DataVaults {
    pub fn new(api_key: impl Into<String>, transports: Transports) -> Self {
        Self::with_config(api_key, transports, DataVaultsConfig::default())
    }

    pub fn with_config(
        api_key: impl Into<String>,
        transports: Transports,
        config: DataVaultsConfig,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            transports,
            protocol: SessionPost {
                provider: "DataVaults",
                base_url: config.base_url,
                extra_fields: &[("utype", "prem")],
                file_field: "file_0",
                progress_interval: config.progress_interval,
            },
        }
    }
}

impl Provider for DataVaults {
    fn name(&self) -> &str {
        "DataVaults"
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
            let code = self
                .protocol
                .upload(
                    &self.transports,
                    &self.api_key,
                    &cancel,
                    source,
                    filename,
                    size,
                    progress,
                )
                .await?;

            let url = self.protocol.file_url(&code);
            info!(provider = "DataVaults", %url, "upload complete");
            Ok(UploadResult {
                url,
                file_id: Some(code),
                ..Default::default()
            })
        })
    }
}
