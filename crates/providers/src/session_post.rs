//! Session-based single multipart POST shared by FileKeeper and DataVaults.
//!
//! 1. `GET {base}/api/upload/server?key=…` yields a session id and the URL of
//!    an upload node.
//! 2. The file is streamed to that node as the file part of one multipart
//!    body, through an in-process pipe while a ticker samples the byte
//!    counter.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use multiuploader_transfer::{ByteCounter, CountingWriter, SpeedCalculator, UploadProgress};
use multiuploader_transport::{Method, TransportError, Transports};
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProviderError, ResultExt};
use crate::provider::{UploadSource, join_url};

/// Default interval between two progress samples.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

const PIPE_CAPACITY: usize = 64 * 1024;
const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
struct ServerResponse {
    status: i64,
    #[serde(default)]
    sess_id: String,
    #[serde(default)]
    result: String,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    file_code: String,
}

/// Wire details that differ between the services speaking this protocol.
#[derive(Debug, Clone)]
pub(crate) struct SessionPost {
    pub provider: &'static str,
    pub base_url: String,
    /// Extra text fields sent after `sess_id`.
    pub extra_fields: &'static [(&'static str, &'static str)],
    pub file_field: &'static str,
    pub progress_interval: Duration,
}

impl SessionPost {
    /// Runs both steps and returns the file code assigned by the service.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        transports: &Transports,
        api_key: &str,
        cancel: &CancellationToken,
        source: &mut dyn UploadSource,
        filename: &str,
        size: u64,
        progress: mpsc::Sender<UploadProgress>,
    ) -> Result<String, ProviderError> {
        let server = self
            .upload_server(transports, api_key, cancel)
            .await
            .context("failed to get upload server")?;
        debug!(provider = self.provider, node = %server.result, "upload server selected");

        self.send_file(transports, &server, cancel, source, filename, size, progress)
            .await
            .context("failed to upload file")
    }

    /// Public page of an uploaded file.
    pub fn file_url(&self, file_code: &str) -> String {
        join_url(&self.base_url, file_code)
    }

    async fn upload_server(
        &self,
        transports: &Transports,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse, ProviderError> {
        let url = join_url(&self.base_url, "api/upload/server");
        let resp = transports
            .default
            .execute(cancel, Method::GET, &url, |req| req.query(&[("key", api_key)]))
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(ProviderError::Rejected(format!(
                "get upload server failed with status {status}"
            )));
        }

        let body = resp.bytes().await.map_err(TransportError::from)?;
        let server: ServerResponse = serde_json::from_slice(&body)?;
        if server.status != 200 {
            return Err(ProviderError::Rejected(format!(
                "{} server returned error: {}",
                self.provider, server.msg
            )));
        }
        Ok(server)
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_file(
        &self,
        transports: &Transports,
        server: &ServerResponse,
        cancel: &CancellationToken,
        source: &mut dyn UploadSource,
        filename: &str,
        size: u64,
        progress: mpsc::Sender<UploadProgress>,
    ) -> Result<String, ProviderError> {
        source.seek(SeekFrom::Start(0)).await?;

        let counter = Arc::new(ByteCounter::new());
        let complete = Arc::new(AtomicBool::new(false));
        let (pipe_tx, pipe_rx) = tokio::io::duplex(PIPE_CAPACITY);
        let pipe = BodyPipe {
            inner: pipe_rx,
            complete: Arc::clone(&complete),
        };

        let body = Body::wrap_stream(ReaderStream::with_capacity(pipe, PIPE_CAPACITY));
        let file = Part::stream(body)
            .file_name(filename.to_string())
            .mime_str(OCTET_STREAM)
            .map_err(TransportError::from)?;
        let mut form = Form::new().text("sess_id", server.sess_id.clone());
        for (name, value) in self.extra_fields {
            form = form.text(*name, *value);
        }
        let mut form = Some(form.part(self.file_field, file));

        let writer = write_body(pipe_tx, source, Arc::clone(&counter), complete);
        let request = transports
            .streaming
            .execute(cancel, Method::POST, &server.result, |req| match form.take() {
                Some(form) => req.multipart(form),
                None => req,
            });

        let transfer = async { tokio::join!(writer, request) };
        tokio::pin!(transfer);

        let mut speed = SpeedCalculator::new();
        let mut ticker = tokio::time::interval(self.progress_interval);
        let (written, response) = loop {
            tokio::select! {
                out = &mut transfer => break out,
                _ = ticker.tick() => {
                    let sent = counter.get();
                    let rate = speed.update(sent);
                    let _ = progress.try_send(UploadProgress::new(sent, size, rate));
                }
            }
        };

        // A source failure is the cause of the aborted request, not the other
        // way round.
        written?;
        let response = response?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ProviderError::Rejected(format!(
                "upload failed with status {status}"
            )));
        }

        let bytes = response.bytes().await.map_err(TransportError::from)?;
        let files: Vec<UploadedFile> = serde_json::from_slice(&bytes)?;
        let Some(file) = files.into_iter().next() else {
            return Err(ProviderError::Rejected(format!(
                "{} returned empty response",
                self.provider
            )));
        };

        let _ = progress.try_send(UploadProgress::finished(size, speed.update(size)));
        Ok(file.file_code)
    }
}

/// Copies the file into the pipe, counting every byte.
///
/// A failed pipe write means the request already ended; its outcome is
/// reported instead.
async fn write_body(
    pipe: DuplexStream,
    source: &mut dyn UploadSource,
    counter: Arc<ByteCounter>,
    complete: Arc<AtomicBool>,
) -> Result<(), ProviderError> {
    let mut pipe = CountingWriter::new(pipe, counter.observer());
    let mut buf = vec![0u8; PIPE_CAPACITY];
    loop {
        let n = source.read(&mut buf).await.context("failed to read file")?;
        if n == 0 {
            break;
        }
        if pipe.write_all(&buf[..n]).await.is_err() {
            return Ok(());
        }
    }
    complete.store(true, Ordering::Release);
    let _ = pipe.shutdown().await;
    Ok(())
}

/// Read half of the body pipe.
///
/// End of stream before the writer marked the file complete is an error, so
/// the request is aborted instead of ending with a truncated file.
struct BodyPipe {
    inner: DuplexStream,
    complete: Arc<AtomicBool>,
}

impl AsyncRead for BodyPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let eof = buf.filled().len() == before && buf.remaining() > 0;
        if eof && !this.complete.load(Ordering::Acquire) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file stream ended early",
            )));
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use serde_json::json;

    use tokio::io::AsyncSeek;

    use crate::testutil::{
        MockResponse, MockServer, Throttle, drain, fast_transports, payload,
        transports_with_timeout,
    };

    fn protocol(base: &str) -> SessionPost {
        SessionPost {
            provider: "TestHost",
            base_url: base.to_string(),
            extra_fields: &[("utype", "prem")],
            file_field: "file_0",
            progress_interval: Duration::from_millis(10),
        }
    }

    fn happy_server() -> impl Fn(&crate::testutil::Recorded, &str) -> MockResponse {
        |req, base| match req.path.as_str() {
            "/api/upload/server" => MockResponse::json(
                200,
                json!({
                    "status": 200,
                    "sess_id": "S1",
                    "result": format!("{base}/upload/node"),
                    "msg": "OK",
                    "server_time": "2024-01-01 00:00:00"
                }),
            ),
            "/upload/node" => MockResponse::json(
                200,
                json!([{ "file_code": "abc123", "file_status": "OK" }]),
            ),
            _ => MockResponse::status(404),
        }
    }

    #[tokio::test]
    async fn uploads_multipart_body() {
        let server = MockServer::start(happy_server()).await;
        let transports = fast_transports();
        let data = payload(200_000);
        let mut source = Cursor::new(data.clone());
        let (tx, mut rx) = mpsc::channel(1024);

        let proto = protocol(&server.url);
        let code = proto
            .upload(
                &transports,
                "KEY",
                &CancellationToken::new(),
                &mut source,
                "report.pdf",
                data.len() as u64,
                tx,
            )
            .await
            .unwrap();

        assert_eq!(code, "abc123");
        assert_eq!(proto.file_url(&code), format!("{}/abc123", server.url));

        let lookup = &server.requests_to("/api/upload/server")[0];
        assert_eq!(lookup.method, "GET");
        assert_eq!(lookup.query("key"), Some("KEY"));

        let post = &server.requests_to("/upload/node")[0];
        assert_eq!(post.method, "POST");
        assert!(
            post.header("content-type")
                .unwrap()
                .starts_with("multipart/form-data; boundary=")
        );
        let body = post.body_text();
        let sess = body.find("name=\"sess_id\"").unwrap();
        let utype = body.find("name=\"utype\"").unwrap();
        let file = body.find("name=\"file_0\"; filename=\"report.pdf\"").unwrap();
        assert!(sess < utype && utype < file);

        let start = post
            .body
            .windows(4)
            .skip(file)
            .position(|w| w == b"\r\n\r\n")
            .unwrap()
            + file
            + 4;
        assert_eq!(&post.body[start..start + data.len()], data.as_slice());

        let events = drain(&mut rx);
        let last = events.last().unwrap();
        assert_eq!(last.bytes_uploaded, data.len() as u64);
        assert_eq!(last.percentage, 100);
    }

    #[tokio::test]
    async fn session_error_names_provider_and_message() {
        let server = MockServer::start(|_, _| {
            MockResponse::json(200, json!({ "status": 403, "msg": "Invalid key" }))
        })
        .await;
        let transports = fast_transports();
        let (tx, _rx) = mpsc::channel(10);

        let err = protocol(&server.url)
            .upload(
                &transports,
                "bad",
                &CancellationToken::new(),
                &mut Cursor::new(payload(10)),
                "a.bin",
                10,
                tx,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to get upload server: TestHost server returned error: Invalid key"
        );
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_file_list_is_fatal() {
        let server = MockServer::start(|req, base| match req.path.as_str() {
            "/api/upload/server" => MockResponse::json(
                200,
                json!({ "status": 200, "sess_id": "S", "result": format!("{base}/node") }),
            ),
            _ => MockResponse::json(200, json!([])),
        })
        .await;
        let transports = fast_transports();
        let (tx, _rx) = mpsc::channel(10);

        let err = protocol(&server.url)
            .upload(
                &transports,
                "KEY",
                &CancellationToken::new(),
                &mut Cursor::new(payload(10)),
                "a.bin",
                10,
                tx,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to upload file: TestHost returned empty response"
        );
    }

    #[tokio::test]
    async fn upload_post_is_not_retried() {
        let server = MockServer::start(|req, base| match req.path.as_str() {
            "/api/upload/server" => MockResponse::json(
                200,
                json!({ "status": 200, "sess_id": "S", "result": format!("{base}/node") }),
            ),
            _ => MockResponse::status(503),
        })
        .await;
        let transports = fast_transports();
        let (tx, _rx) = mpsc::channel(10);

        let err = protocol(&server.url)
            .upload(
                &transports,
                "KEY",
                &CancellationToken::new(),
                &mut Cursor::new(payload(1000)),
                "a.bin",
                1000,
                tx,
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("upload failed with status 503"), "{err}");
        assert_eq!(server.requests_to("/node").len(), 1);
    }

    #[tokio::test]
    async fn cancellation_during_post() {
        let server = MockServer::start(|req, base| match req.path.as_str() {
            "/api/upload/server" => MockResponse::json(
                200,
                json!({ "status": 200, "sess_id": "S", "result": format!("{base}/node") }),
            ),
            _ => MockResponse::hang(),
        })
        .await;
        let transports = fast_transports();
        let (tx, _rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = protocol(&server.url)
            .upload(
                &transports,
                "KEY",
                &cancel,
                &mut Cursor::new(payload(1000)),
                "a.bin",
                1000,
                tx,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled(), "{err}");
        assert_eq!(err.to_string(), "upload cancelled");
    }

    #[tokio::test]
    async fn streamed_post_outlives_request_deadline() {
        let throttle = Throttle {
            chunk: 64 * 1024,
            pause: Duration::from_millis(10),
        };
        let server = MockServer::start_throttled(happy_server(), throttle).await;
        // Bounded profiles give up after one second; draining 16 MiB at
        // 64 KiB per 10 ms takes well over two.
        let transports = transports_with_timeout(Duration::from_secs(1));
        let data = payload(16 * 1024 * 1024);
        let (tx, _rx) = mpsc::channel(1024);

        let started = std::time::Instant::now();
        let code = protocol(&server.url)
            .upload(
                &transports,
                "KEY",
                &CancellationToken::new(),
                &mut Cursor::new(data.clone()),
                "big.iso",
                data.len() as u64,
                tx,
            )
            .await
            .unwrap();

        assert_eq!(code, "abc123");
        assert!(started.elapsed() > Duration::from_secs(1));
        let post = &server.requests_to("/upload/node")[0];
        assert!(post.body.len() > data.len());
    }

    /// Serves `data` but fails every read once `fail_at` bytes were handed out.
    struct BrokenSource {
        data: Cursor<Vec<u8>>,
        fail_at: u64,
    }

    impl AsyncRead for BrokenSource {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            if this.data.position() >= this.fail_at {
                return Poll::Ready(Err(io::Error::other("disk gone")));
            }
            Pin::new(&mut this.data).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for BrokenSource {
        fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
            Pin::new(&mut self.get_mut().data).start_seek(position)
        }

        fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Pin::new(&mut self.get_mut().data).poll_complete(cx)
        }
    }

    #[tokio::test]
    async fn source_failure_aborts_the_post() {
        let server = MockServer::start(happy_server()).await;
        let transports = fast_transports();
        let (tx, _rx) = mpsc::channel(10);
        let mut source = BrokenSource {
            data: Cursor::new(payload(200_000)),
            fail_at: 100_000,
        };

        let err = protocol(&server.url)
            .upload(
                &transports,
                "KEY",
                &CancellationToken::new(),
                &mut source,
                "a.bin",
                200_000,
                tx,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to upload file: failed to read file: I/O error: disk gone"
        );
        // The server never saw a complete body.
        assert!(server.requests_to("/upload/node").is_empty());
    }
}
