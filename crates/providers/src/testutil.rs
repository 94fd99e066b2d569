//! Throwaway HTTP/1.1 server for backend tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use multiuploader_transfer::UploadProgress;
use multiuploader_transport::{BackoffConfig, ClientConfig, Transports};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Hold the connection open without answering.
    pub hang: bool,
}

impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.to_string(),
            hang: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            hang: false,
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::status(200)
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

type Handler = dyn Fn(&Recorded, &str) -> MockResponse + Send + Sync;

/// Reads request bodies `chunk` bytes at a time with a pause in between.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    pub chunk: usize,
    pub pause: Duration,
}

pub struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Starts a server answering every request through `handler`, which also
    /// receives the server's base URL.
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&Recorded, &str) -> MockResponse + Send + Sync + 'static,
    {
        Self::start_with(handler, None).await
    }

    /// Like [`start`](Self::start) but drains request bodies slowly.
    pub async fn start_throttled<H>(handler: H, throttle: Throttle) -> Self
    where
        H: Fn(&Recorded, &str) -> MockResponse + Send + Sync + 'static,
    {
        Self::start_with(handler, Some(throttle)).await
    }

    async fn start_with<H>(handler: H, throttle: Option<Throttle>) -> Self
    where
        H: Fn(&Recorded, &str) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let base = url.clone();
        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                let base = base.clone();
                tokio::spawn(async move {
                    serve(stream, handler, log, base, throttle).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<Recorded>>>,
    base: String,
    throttle: Option<Throttle>,
) {
    let Some(request) = read_request(&mut stream, throttle).await else {
        return;
    };
    let response = handler(&request, &base);
    log.lock().unwrap().push(request);

    if response.hang {
        tokio::time::sleep(Duration::from_secs(60)).await;
        return;
    }

    let mut head = format!("HTTP/1.1 {} Mock\r\n", response.status);
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(response.body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream, throttle: Option<Throttle>) -> Option<Recorded> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let mut drain = Drain {
        throttle,
        since_pause: 0,
    };
    let mut body = Vec::new();
    if let Some(len) = headers.get("content-length") {
        let len: usize = len.parse().ok()?;
        body.resize(len, 0);
        drain.read(&mut reader, &mut body).await?;
    } else if headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).await.ok()?;
            let size_hex = size_line.trim().split(';').next()?;
            let size = usize::from_str_radix(size_hex, 16).ok()?;
            if size == 0 {
                let mut trailer = String::new();
                reader.read_line(&mut trailer).await.ok()?;
                break;
            }
            let start = body.len();
            body.resize(start + size, 0);
            drain.read(&mut reader, &mut body[start..]).await?;
            let mut crlf = String::new();
            reader.read_line(&mut crlf).await.ok()?;
        }
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (target, HashMap::new()),
    };

    Some(Recorded {
        method,
        path,
        query,
        headers,
        body,
    })
}

/// Paces body reads according to an optional [`Throttle`].
struct Drain {
    throttle: Option<Throttle>,
    since_pause: usize,
}

impl Drain {
    async fn read(
        &mut self,
        reader: &mut BufReader<&mut TcpStream>,
        mut buf: &mut [u8],
    ) -> Option<()> {
        let Some(throttle) = self.throttle else {
            return reader.read_exact(buf).await.ok().map(drop);
        };
        let chunk = throttle.chunk.max(1);
        while !buf.is_empty() {
            let n = buf.len().min(chunk - self.since_pause);
            let (head, rest) = std::mem::take(&mut buf).split_at_mut(n);
            reader.read_exact(head).await.ok()?;
            buf = rest;
            self.since_pause += n;
            if self.since_pause == chunk {
                self.since_pause = 0;
                tokio::time::sleep(throttle.pause).await;
            }
        }
        Some(())
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect()
}

fn decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 2;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Transports with short timeouts and backoff so retry paths run quickly.
pub fn fast_transports() -> Transports {
    transports_with_timeout(Duration::from_secs(5))
}

/// Like [`fast_transports`] with `timeout` on the bounded profiles. The
/// streaming profile never has a deadline.
pub fn transports_with_timeout(timeout: Duration) -> Transports {
    let config = ClientConfig {
        timeout: Some(timeout),
        max_retries: 3,
        max_elapsed: Duration::from_secs(30),
        backoff: BackoffConfig {
            initial_interval: Duration::from_millis(20),
            multiplier: 2.0,
            max_interval: Duration::from_millis(200),
        },
        ..ClientConfig::default_profile()
    };
    let streaming = ClientConfig {
        timeout: None,
        max_retries: 0,
        ..config.clone()
    };
    Transports::with_configs(config.clone(), config, streaming).unwrap()
}

/// Collects every snapshot still queued in `rx`.
pub fn drain(rx: &mut mpsc::Receiver<UploadProgress>) -> Vec<UploadProgress> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p);
    }
    out
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
