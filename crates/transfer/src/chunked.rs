use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::TransferError;

/// Byte range of one part in a chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpan {
    /// 1-based part number.
    pub number: u32,
    pub start: u64,
    pub len: u64,
}

impl PartSpan {
    /// Span of part `number` for a file of `size` bytes split into
    /// `chunk_size` pieces. The last part is clamped to the file end.
    ///
    /// An empty file has a single empty part 1.
    pub fn nth(number: u32, chunk_size: u64, size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(chunk_size));
        }
        let start = u64::from(number.saturating_sub(1)).saturating_mul(chunk_size);
        let empty_first = number == 1 && size == 0;
        if number == 0 || (start >= size && !empty_first) {
            return Err(TransferError::PartOutOfRange { number, size });
        }
        Ok(Self {
            number,
            start,
            len: chunk_size.min(size - start),
        })
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Seeks `source` to the part start and reads exactly the part's bytes.
pub async fn read_part<R>(source: &mut R, span: PartSpan) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    source.seek(SeekFrom::Start(span.start)).await?;

    let mut buf = Vec::with_capacity(span.len as usize);
    let read = (&mut *source).take(span.len).read_to_end(&mut buf).await?;
    if read as u64 != span.len {
        return Err(TransferError::ShortRead {
            number: span.number,
            expected: span.len,
            actual: read as u64,
        });
    }
    Ok(buf)
}
