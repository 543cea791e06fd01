//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// What the mock server does with the next request it reads.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Raw bytes written back as the response.
    Raw(Vec<u8>),
    /// Close the socket without answering.
    Disconnect,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::status(200, "OK", &[], body.as_bytes())
    }

    pub fn status(code: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) -> Self {
        let mut head = format!("HTTP/1.1 {code} {reason}\r\n");
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        if !headers.iter().any(|(name, _)| {
            name.eq_ignore_ascii_case("Content-Length")
                || name.eq_ignore_ascii_case("Transfer-Encoding")
        }) {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        let mut raw = head.into_bytes();
        raw.extend_from_slice(body);
        Self::Raw(raw)
    }

    pub fn redirect(code: u16, location: &str) -> Self {
        Self::status(code, "Redirect", &[("Location", location)], b"")
    }

    fn not_found() -> Self {
        Self::status(404, "Not Found", &[], b"")
    }
}

/// A request as the mock server read it off the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct ServerState {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    connections: AtomicUsize,
}

/// An in-process HTTP/1.1 server that replays scripted replies in order.
///
/// Sockets are kept alive between requests unless a reply carries `Connection: close`.
/// Once the script runs out every request gets a 404.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl MockServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState {
            replies: Mutex::new(replies.into()),
            ..ServerState::default()
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Sockets accepted so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

async fn serve(socket: TcpStream, state: Arc<ServerState>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    while let Some(request) = read_request(&mut reader).await {
        state.requests.lock().unwrap().push(request);
        let reply = state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Reply::not_found);

        match reply {
            Reply::Disconnect => return,
            Reply::Raw(bytes) => {
                if write.write_all(&bytes).await.is_err() {
                    return;
                }
                let head = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
                if head.contains("connection: close") {
                    let _ = write.shutdown().await;
                    return;
                }
            }
        }
    }
}

async fn read_request(reader: &mut BufReader<OwnedReadHalf>) -> Option<RecordedRequest> {
    let request_line = read_line(reader).await?;
    let mut parts = request_line.split(' ');
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut request = RecordedRequest {
        method,
        target,
        headers,
        body: Vec::new(),
    };

    if request
        .header("Transfer-Encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        loop {
            let size = usize::from_str_radix(read_line(reader).await?.trim(), 16).ok()?;
            if size == 0 {
                read_line(reader).await?;
                break;
            }
            let mut chunk = vec![0u8; size];
            reader.read_exact(&mut chunk).await.ok()?;
            request.body.extend_from_slice(&chunk);
            read_line(reader).await?;
        }
    } else if let Some(length) = request.header("Content-Length") {
        let mut body = vec![0u8; length.parse().ok()?];
        reader.read_exact(&mut body).await.ok()?;
        request.body = body;
    }

    Some(request)
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.ok()?;
    if n == 0 {
        return None;
    }
    Some(line.trim_end_matches(['\r', '\n']).to_string())
}
