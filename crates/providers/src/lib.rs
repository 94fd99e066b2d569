//! File-hosting backends.
//!
//! Every backend implements [`Provider`] on top of the shared
//! [`Transports`](multiuploader_transport::Transports). Three wire protocols
//! are covered:
//!
//! - session-based multipart POST ([`FileKeeper`], [`DataVaults`])
//! - size-branching single POST or presigned multipart ([`Rootz`])
//! - presigned-URL chunked multipart ([`AkiraBox`])
//!
//! [`ProviderRegistry`] maps display names to factories so callers can build
//! a backend with the API key currently stored in settings.

mod akirabox;
mod datavaults;
mod error;
mod filekeeper;
mod mock;
mod presigned;
mod provider;
mod registry;
mod rootz;
mod session_post;

#[cfg(test)]
mod testutil;

pub use akirabox::{AKIRABOX_BASE_URL, AkiraBox, AkiraBoxConfig};
pub use datavaults::{DATAVAULTS_BASE_URL, DataVaults, DataVaultsConfig};
pub use error::ProviderError;
pub use filekeeper::{FILEKEEPER_BASE_URL, FileKeeper, FileKeeperConfig};
pub use mock::MockProvider;
pub use provider::{BoxFuture, Provider, UploadSource};
pub use registry::{ProviderFactory, ProviderRegistry, default_registry};
pub use rootz::{ROOTZ_BASE_URL, ROOTZ_MULTIPART_THRESHOLD, Rootz, RootzConfig};
pub use session_post::DEFAULT_PROGRESS_INTERVAL;
