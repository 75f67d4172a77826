//! In-process HTTP server for exercising the client end to end.
//!
//! Every connection is served on its own task so concurrent calls overlap.
//! Responses always close the connection, which keeps one request per
//! connection and makes request counts exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn rpc_method(&self) -> Option<&str> {
        self.body.get("method").and_then(Value::as_str)
    }

    pub fn path(&self) -> &str {
        self.request_line.split(' ').nth(1).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    chunk_sizes: Vec<usize>,
    delay: Option<Duration>,
}

impl MockResponse {
    fn new(status: u16, reason: &'static str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            reason,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
            chunk_sizes: Vec::new(),
            delay: None,
        }
    }

    pub fn json(value: Value) -> Self {
        Self::new(200, "OK", "application/json", value.to_string().into_bytes())
    }

    pub fn sse(stream: &str) -> Self {
        Self::new(200, "OK", "text/event-stream", stream.as_bytes().to_vec())
    }

    pub fn raw(content_type: &str, body: &str) -> Self {
        Self::new(200, "OK", content_type, body.as_bytes().to_vec())
    }

    pub fn status(status: u16, reason: &'static str) -> Self {
        Self::new(status, reason, "text/plain", reason.as_bytes().to_vec())
    }

    pub fn accepted() -> Self {
        Self::new(202, "Accepted", "application/json", Vec::new())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Writes the body in pieces of these sizes, pausing between them.
    pub fn in_chunks(mut self, sizes: &[usize]) -> Self {
        self.chunk_sizes = sizes.to_vec();
        self
    }

    fn head(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!(
            "content-length: {}\r\nconnection: close\r\n\r\n",
            self.body.len()
        ));
        head.into_bytes()
    }

    async fn write_to(&self, stream: &mut TcpStream) -> std::io::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        stream.write_all(&self.head()).await?;

        let mut rest = self.body.as_slice();
        for size in &self.chunk_sizes {
            let take = (*size).min(rest.len());
            let (chunk, tail) = rest.split_at(take);
            stream.write_all(chunk).await?;
            stream.flush().await?;
            tokio::time::sleep(Duration::from_millis(15)).await;
            rest = tail;
        }
        stream.write_all(rest).await?;
        stream.flush().await?;
        stream.shutdown().await
    }
}

type Handler = dyn Fn(&CapturedRequest, usize) -> MockResponse + Send + Sync;

pub struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Starts serving. The handler receives each request together with how
    /// many earlier requests carried the same JSON-RPC method.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&CapturedRequest, usize) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, recorded, handler).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}"),
            requests,
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count_method(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.rpc_method() == Some(method))
            .count()
    }

    pub fn requests_for(&self, method: &str) -> Vec<CapturedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.rpc_method() == Some(method))
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    recorded: Arc<Mutex<Vec<CapturedRequest>>>,
    handler: Arc<Handler>,
) -> Result<(), String> {
    let (request_line, headers, body) = read_http_request(&mut stream).await?;
    let request = CapturedRequest {
        request_line,
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };

    let seen = {
        let mut recorded = recorded.lock().map_err(|err| err.to_string())?;
        let seen = recorded
            .iter()
            .filter(|earlier| earlier.rpc_method() == request.rpc_method())
            .count();
        recorded.push(request.clone());
        seen
    };

    handler(&request, seen)
        .write_to(&mut stream)
        .await
        .map_err(|err| err.to_string())
}

async fn read_http_request(
    stream: &mut TcpStream,
) -> Result<(String, Vec<(String, String)>, Vec<u8>), String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or_else(|| "Missing header terminator".to_string())?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok((request_line, headers, body))
}
