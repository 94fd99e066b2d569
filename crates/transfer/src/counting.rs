//! Transparent reader/writer wrappers that report bytes as they flow.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

/// Lock-free running byte total shared between a transfer and a poller.
#[derive(Debug, Default)]
pub struct ByteCounter(AtomicU64);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` and returns the new total.
    pub fn add(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Callback that feeds this counter, for use with the counting wrappers.
    pub fn observer(self: &Arc<Self>) -> impl FnMut(u64) + Send + Unpin + 'static {
        let counter = Arc::clone(self);
        move |n| {
            counter.add(n);
        }
    }
}

/// Reader that invokes a callback with the size of every non-empty read.
#[derive(Debug)]
pub struct CountingReader<R, F> {
    inner: R,
    on_read: F,
}

impl<R, F: FnMut(u64)> CountingReader<R, F> {
    pub fn new(inner: R, on_read: F) -> Self {
        Self { inner, on_read }
    }
}

impl<R, F> AsyncRead for CountingReader<R, F>
where
    R: AsyncRead + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            if n > 0 {
                (this.on_read)(n as u64);
            }
        }
        poll
    }
}

impl<R, F> AsyncSeek for CountingReader<R, F>
where
    R: AsyncSeek + Unpin,
    F: Unpin,
{
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().inner).poll_complete(cx)
    }
}

/// Writer that invokes a callback with the size of every non-empty write.
#[derive(Debug)]
pub struct CountingWriter<W, F> {
    inner: W,
    on_write: F,
}

impl<W, F: FnMut(u64)> CountingWriter<W, F> {
    pub fn new(inner: W, on_write: F) -> Self {
        Self { inner, on_write }
    }
}

impl<W, F> AsyncWrite for CountingWriter<W, F>
where
    W: AsyncWrite + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll
            && n > 0
        {
            (this.on_write)(n as u64);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

    #[test]
    fn counter_add_returns_total() {
        let c = ByteCounter::new();
        assert_eq!(c.add(5), 5);
        assert_eq!(c.add(7), 12);
        assert_eq!(c.get(), 12);
    }

    #[tokio::test]
    async fn counter_no_lost_updates() {
        for tasks in [1usize, 10, 100] {
            let counter = Arc::new(ByteCounter::new());
            let mut handles = Vec::with_capacity(tasks);
            for _ in 0..tasks {
                let c = Arc::clone(&counter);
                handles.push(tokio::spawn(async move {
                    for _ in 0..1000 {
                        c.add(3);
                        tokio::task::yield_now().await;
                    }
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
            assert_eq!(counter.get(), tasks as u64 * 3000, "tasks = {tasks}");
        }
    }

    #[test]
    fn counter_no_lost_updates_threads() {
        let counter = Arc::new(ByteCounter::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let c = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        c.add(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get(), 100_000);
    }

    #[tokio::test]
    async fn async_reader_counts_and_seeks() {
        let counter = Arc::new(ByteCounter::new());
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut reader = CountingReader::new(Cursor::new(data.clone()), counter.observer());

        reader.seek(SeekFrom::Start(4000)).await.unwrap();
        let mut out = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut out).await.unwrap();

        assert_eq!(out, data[4000..]);
        assert_eq!(counter.get(), 6000);
    }

    #[tokio::test]
    async fn async_reader_errors_do_not_count() {
        struct Failing;
        impl AsyncRead for Failing {
            fn poll_read(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &mut ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                Poll::Ready(Err(io::Error::other("boom")))
            }
        }

        let counter = Arc::new(ByteCounter::new());
        let mut reader = CountingReader::new(Failing, counter.observer());
        let mut buf = [0u8; 16];
        let err = AsyncReadExt::read(&mut reader, &mut buf).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn async_writer_skips_empty_writes() {
        let mut seen = Vec::new();
        let mut writer = CountingWriter::new(Vec::new(), |n| seen.push(n));
        AsyncWriteExt::write_all(&mut writer, b"abc").await.unwrap();
        AsyncWriteExt::write_all(&mut writer, b"").await.unwrap();
        AsyncWriteExt::write_all(&mut writer, b"defg").await.unwrap();
        drop(writer);
        assert_eq!(seen.iter().sum::<u64>(), 7);
        assert!(seen.iter().all(|&n| n > 0));
    }

    #[tokio::test]
    async fn async_writer_through_duplex() {
        let counter = Arc::new(ByteCounter::new());
        let (tx, mut rx) = tokio::io::duplex(64);
        let mut writer = CountingWriter::new(tx, counter.observer());

        let payload = vec![7u8; 1000];
        let expected = payload.clone();
        let write = async move {
            AsyncWriteExt::write_all(&mut writer, &payload).await.unwrap();
            AsyncWriteExt::shutdown(&mut writer).await.unwrap();
        };
        let read = async move {
            let mut out = Vec::new();
            AsyncReadExt::read_to_end(&mut rx, &mut out).await.unwrap();
            out
        };
        let ((), out) = tokio::join!(write, read);

        assert_eq!(out, expected);
        assert_eq!(counter.get(), 1000);
    }
}
