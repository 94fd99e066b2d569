//! Progress model, byte-counting I/O and part planning for uploads.
//!
//! Everything here is provider-agnostic: backends combine these pieces with
//! the transport to report progress while streaming file bytes.

mod chunked;
mod counting;
mod progress;
mod types;

pub use chunked::{PartSpan, read_part};
pub use counting::{ByteCounter, CountingReader, CountingWriter};
pub use progress::{SpeedCalculator, format_eta, format_size, format_speed, percentage};
pub use types::{UploadProgress, UploadResult};

/// Default number of bytes between two chunked-upload progress events.
pub const DEFAULT_PROGRESS_STEP: u64 = 512 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("part {number} is out of range for a {size} byte file")]
    PartOutOfRange { number: u32, size: u64 },

    #[error("short read on part {number}: expected {expected} bytes, got {actual}")]
    ShortRead {
        number: u32,
        expected: u64,
        actual: u64,
    },
}
