//! Canned HTTP/1.1 servers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What a test server saw.
#[derive(Default)]
pub struct ServerLog {
    pub connections: AtomicUsize,
    pub requests: Mutex<Vec<String>>,
}

impl ServerLog {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Lowercased request `n`, for case-insensitive header checks.
    pub fn request_lower(&self, n: usize) -> String {
        self.requests()[n].to_ascii_lowercase()
    }
}

pub struct TestServer {
    pub base: String,
    pub port: u16,
    pub log: Arc<ServerLog>,
}

/// Read one request (head plus Content-Length body). `None` on EOF.
pub async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return Some(String::from_utf8_lossy(&buf[..end + 4 + body_len]).into_owned());
            }
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Serve keep-alive connections. `handler` gets the request text and the
/// zero-based request index and returns the raw response. A response
/// containing `Connection: close` ends its connection.
pub async fn spawn_server<F>(handler: F) -> TestServer
where
    F: Fn(&str, usize) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(ServerLog::default());
    let handler = Arc::new(handler);

    let server_log = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            server_log.connections.fetch_add(1, Ordering::SeqCst);
            let log = server_log.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                while let Some(request) = read_request(&mut socket).await {
                    let index = {
                        let mut requests = log.requests.lock().unwrap();
                        requests.push(request.clone());
                        requests.len() - 1
                    };
                    let response = handler(&request, index);
                    if socket.write_all(response.as_bytes()).await.is_err() {
                        break;
                    }
                    if response.to_ascii_lowercase().contains("connection: close") {
                        break;
                    }
                }
            });
        }
    });

    TestServer { base: format!("http://127.0.0.1:{}", addr.port()), port: addr.port(), log }
}

pub fn ok(body: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body)
}

pub fn ok_with(headers: &str, body: &str) -> String {
    format!("HTTP/1.1 200 OK\r\n{}Content-Length: {}\r\n\r\n{}", headers, body.len(), body)
}
