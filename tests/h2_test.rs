//! HTTP/2 over cleartext TCP with prior knowledge, against a scripted
//! frame-level server.

use browsernet::http::HttpVersion;
use browsernet::http2::frame::{decode_frame, Frame, PREFACE};
use browsernet::http2::hpack::{Decoder, Encoder, HeaderField};
use browsernet::http2::ErrorCode;
use browsernet::{HttpClient, Request};
use bytes::{Bytes, BytesMut};
use http::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// A request as seen by the server: decoded header fields and body.
#[derive(Debug, Clone, Default)]
struct SeenRequest {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl SeenRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Respond,
    /// GOAWAY before processing anything, on the first connection only.
    GoAwayFirstConnection,
}

struct H2Server {
    base: String,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

async fn spawn_h2_server(behavior: Behavior) -> H2Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (conns, reqs) = (connections.clone(), requests.clone());
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { break };
            let index = conns.fetch_add(1, Ordering::SeqCst);
            let reqs = reqs.clone();
            let refuse = behavior == Behavior::GoAwayFirstConnection && index == 0;
            tokio::spawn(serve_connection(socket, refuse, reqs));
        }
    });

    H2Server { base: format!("http://127.0.0.1:{port}"), connections, requests }
}

async fn serve_connection(mut socket: TcpStream, refuse: bool, requests: Arc<Mutex<Vec<SeenRequest>>>) {
    let mut preface = [0u8; 24];
    if socket.read_exact(&mut preface).await.is_err() || preface != PREFACE {
        return;
    }
    let mut out = BytesMut::new();
    Frame::Settings { ack: false, params: Vec::new() }.encode(&mut out);
    if socket.write_all(&out).await.is_err() {
        return;
    }

    let mut decoder = Decoder::new(4096);
    let mut encoder = Encoder::new(4096);
    let mut pending: Option<(u32, SeenRequest)> = None;
    let mut buf = BytesMut::new();

    loop {
        while let Ok(Some((frame, used))) = decode_frame(&buf, 1 << 20) {
            let _ = buf.split_to(used);
            let mut out = BytesMut::new();
            let mut finished = None;
            match frame {
                Frame::Settings { ack: false, .. } => Frame::Settings { ack: true, params: Vec::new() }.encode(&mut out),
                Frame::Headers { stream_id, fragment, end_stream, .. } => {
                    if refuse {
                        Frame::GoAway { last_stream_id: 0, error_code: ErrorCode::NoError, debug_data: Bytes::new() }
                            .encode(&mut out);
                        let _ = socket.write_all(&out).await;
                        return;
                    }
                    let fields = decoder.decode(&fragment).unwrap();
                    let seen = SeenRequest {
                        headers: fields
                            .into_iter()
                            .map(|f| {
                                (String::from_utf8(f.name).unwrap(), String::from_utf8(f.value).unwrap())
                            })
                            .collect(),
                        body: Vec::new(),
                    };
                    if end_stream {
                        finished = Some((stream_id, seen));
                    } else {
                        pending = Some((stream_id, seen));
                    }
                }
                Frame::Data { stream_id, payload, end_stream, .. } => {
                    if let Some((_, seen)) = pending.as_mut() {
                        seen.body.extend_from_slice(&payload);
                    }
                    if end_stream {
                        finished = pending.take().filter(|(id, _)| *id == stream_id);
                    }
                }
                _ => {}
            }

            if let Some((stream_id, seen)) = finished {
                let body = format!("h2 {}", seen.header(":path").unwrap_or(""));
                requests.lock().unwrap().push(seen);
                let mut block = Vec::new();
                encoder.encode(
                    &[
                        HeaderField::new(":status", "200"),
                        HeaderField::new("content-type", "text/plain"),
                        HeaderField::new("content-length", body.len().to_string()),
                    ],
                    &mut block,
                );
                Frame::Headers { stream_id, fragment: Bytes::from(block), end_stream: false, end_headers: true }
                    .encode(&mut out);
                Frame::Data {
                    stream_id,
                    payload: Bytes::from(body.clone()),
                    end_stream: true,
                    flow_len: body.len() as u32,
                }
                .encode(&mut out);
            }
            if !out.is_empty() && socket.write_all(&out).await.is_err() {
                return;
            }
        }
        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

fn client() -> HttpClient {
    HttpClient::builder().http2_prior_knowledge(true).build()
}

fn get(url: &str) -> Request {
    Request::get(&Url::parse(url).unwrap()).unwrap()
}

#[tokio::test]
async fn test_prior_knowledge_get() {
    let server = spawn_h2_server(Behavior::Respond).await;
    let client = client();

    let response = client.fetch(get(&format!("{}/hello?x=1", server.base)), None).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.version, HttpVersion::Http2);
    assert_eq!(response.text(), "h2 /hello?x=1");
    assert_eq!(response.headers.get("content-type"), Some("text/plain"));

    let seen = server.requests.lock().unwrap()[0].clone();
    assert_eq!(seen.header(":method"), Some("GET"));
    assert_eq!(seen.header(":scheme"), Some("http"));
    assert_eq!(seen.header(":path"), Some("/hello?x=1"));
    assert!(seen.header(":authority").is_some_and(|a| a.starts_with("127.0.0.1:")));
    // Pseudo-headers come first and connection-specific headers are dropped.
    assert!(seen.headers[..4].iter().all(|(n, _)| n.starts_with(':')));
    assert!(seen.header("host").is_none());
    assert!(seen.header("connection").is_none());
}

#[tokio::test]
async fn test_streams_share_one_connection() {
    let server = spawn_h2_server(Behavior::Respond).await;
    let client = client();

    for path in ["/a", "/b", "/c"] {
        let response = client.fetch(get(&format!("{}{path}", server.base)), None).await.unwrap();
        assert_eq!(response.text(), format!("h2 {path}"));
    }
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_streams() {
    let server = spawn_h2_server(Behavior::Respond).await;
    let client = client();
    // Establish the connection first so the concurrent fetches share it.
    client.fetch(get(&format!("{}/warm", server.base)), None).await.unwrap();

    let fetches = (0..5)
        .map(|i| {
            let client = client.clone();
            let url = format!("{}/s{i}", server.base);
            tokio::spawn(async move { client.fetch(get(&url), None).await })
        })
        .collect::<Vec<_>>();
    for (i, handle) in fetches.into_iter().enumerate() {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.text(), format!("h2 /s{i}"));
    }
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_post_body_in_data_frames() {
    let server = spawn_h2_server(Behavior::Respond).await;
    let client = client();
    let url = Url::parse(&format!("{}/upload", server.base)).unwrap();
    let request = Request::new(Method::POST, &url).unwrap().with_body(vec![7u8; 40_000]);

    let response = client.fetch(request, None).await.unwrap();
    assert_eq!(response.status, 200);

    let seen = server.requests.lock().unwrap()[0].clone();
    assert_eq!(seen.header(":method"), Some("POST"));
    assert_eq!(seen.body.len(), 40_000);
}

#[tokio::test]
async fn test_goaway_before_processing_is_retried() {
    let server = spawn_h2_server(Behavior::GoAwayFirstConnection).await;
    let client = client();

    let response = client.fetch(get(&format!("{}/again", server.base)), None).await.unwrap();
    assert_eq!(response.text(), "h2 /again");
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);
}
