//! Logging setup.
//!
//! Events are written as JSON lines to a size-capped `app.log` in the
//! platform log directory:
//! - Linux: `~/.local/share/multiUploader/logs`
//! - macOS: `~/Library/Logs/multiUploader`
//! - Windows: `%LOCALAPPDATA%\multiUploader\logs`
//!
//! The file sink records errors only unless `RUST_LOG` says otherwise. An
//! optional human readable layer writes to stderr.

mod rotate;

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub use rotate::{DEFAULT_MAX_LOG_SIZE, LOG_FILE_NAME, OLD_LOG_FILE_NAME, RotatingFile};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log directory; defaults to [`log_dir`].
    pub dir: Option<PathBuf>,
    pub max_size: u64,
    /// Filter for the file sink when `RUST_LOG` is unset.
    pub file_level: String,
    /// Filter for the stderr layer; `None` disables it.
    pub stderr_level: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: None,
            max_size: DEFAULT_MAX_LOG_SIZE,
            file_level: "error".into(),
            stderr_level: None,
        }
    }
}

/// Installs the global subscriber. Returns the directory logs are written to.
pub fn init(options: LogOptions) -> Result<PathBuf, LoggingError> {
    let dir = options.dir.clone().unwrap_or_else(log_dir);
    let file = RotatingFile::open(&dir, options.max_size)?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.file_level));
    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(file)
        .with_filter(file_filter);

    let stderr_layer = options.stderr_level.as_deref().map(|level| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new(level))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    tracing::debug!(dir = %dir.display(), "logging initialised");
    Ok(dir)
}

/// Returns the platform-specific log directory.
pub fn log_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let local = std::env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        PathBuf::from(local).join("multiUploader").join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join("Library")
            .join("Logs")
            .join("multiUploader")
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("multiUploader")
            .join("logs")
    }
}
