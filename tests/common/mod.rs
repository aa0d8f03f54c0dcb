//! Shared utilities for integration testing: mock backends and a gateway
//! bound to an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use authgate::auth::SessionStore;
use authgate::config::{ProxyConfig, UserCredential};
use authgate::lifecycle::Shutdown;
use authgate::mapping::{MemorySource, Rule};
use authgate::HttpServer;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

pub const API_KEY: &str = "test-admin-key";
pub const COOKIE: &str = "authgate_session";

/// Configuration with two users (alice is admin, bob is not) and short timeouts.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.users = vec![
        UserCredential {
            username: "alice".into(),
            password: "secret".into(),
        },
        UserCredential {
            username: "bob".into(),
            password: "hunter2".into(),
        },
    ];
    config.auth.admin_users = vec!["alice".into()];
    config.auth.api_key = Some(API_KEY.to_string());
    config.timeouts.connect_secs = 2;
    config.timeouts.relay_secs = 10;
    config
}

/// A running gateway over an in-memory rule table.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub sessions: Arc<SessionStore>,
    pub source: Arc<MemorySource>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// `Cookie` header value for a fresh session of `username`.
    pub fn login_cookie(&self, username: &str) -> String {
        format!("{}={}", COOKIE, self.sessions.issue(username))
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        let _ = self.shutdown.trigger();
    }
}

pub async fn spawn_gateway(config: ProxyConfig, rules: Vec<Rule>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let source = Arc::new(MemorySource::new(rules));
    let server = HttpServer::with_source(config, source.clone());
    let sessions = server.sessions();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        sessions,
        source,
        shutdown,
    }
}

/// HTTP client that does not follow redirects and ignores proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Read one HTTP/1.1 request: head as text plus a Content-Length body.
async fn read_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some((head, body))
}

/// Backend answering every request with the request it received: the head
/// lowercased, a blank line, then the body.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Some((head, body)) = read_request(&mut socket).await else {
                    return;
                };
                let mut payload = head.to_ascii_lowercase().into_bytes();
                payload.extend_from_slice(b"\r\n\r\n");
                payload.extend_from_slice(&body);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nX-Backend: echo\r\nKeep-Alive: timeout=5\r\nConnection: close\r\n\r\n",
                    payload.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&payload).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Backend that sends `first`, waits `delay`, then sends `second`, as a
/// chunked body.
pub async fn start_slow_backend(first: &'static str, delay: Duration, second: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_none() {
                    return;
                }
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket
                    .write_all(format!("{:x}\r\n{}\r\n", first.len(), first).as_bytes())
                    .await;
                let _ = socket.flush().await;

                tokio::time::sleep(delay).await;

                let _ = socket
                    .write_all(format!("{:x}\r\n{}\r\n0\r\n\r\n", second.len(), second).as_bytes())
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// How a WebSocket backend connection ended: the close frame it received as
/// (code, reason), or `None` if the peer went away without one.
pub type ReceivedClose = Option<(u16, String)>;

/// WebSocket backend that echoes text and binary messages, accepts the first
/// offered subprotocol and reports how every connection ended.
///
/// The text `close-me` is answered with a 4000/"bye" close; `drop-me` makes
/// the backend drop the TCP connection without a close frame.
pub async fn start_ws_backend() -> (SocketAddr, mpsc::UnboundedReceiver<ReceivedClose>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                    let offered = request
                        .headers()
                        .get("sec-websocket-protocol")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.split(',').next())
                        .map(|p| p.trim().to_string());
                    if let Some(protocol) = offered {
                        response
                            .headers_mut()
                            .insert("sec-websocket-protocol", protocol.parse().unwrap());
                    }
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };

                let mut received = None;
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(ref text) if text.as_str() == "close-me" => {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::from(4000),
                                    reason: "bye".into(),
                                }))
                                .await;
                        }
                        Message::Text(ref text) if text.as_str() == "drop-me" => return,
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(frame) => {
                            received = frame.map(|f| (u16::from(f.code), f.reason.as_str().to_string()));
                            break;
                        }
                        _ => {}
                    }
                }
                let _ = tx.send(received);
            });
        }
    });
    (addr, rx)
}

/// WebSocket backend that never selects a subprotocol and echoes messages.
pub async fn start_plain_ws_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() || message.is_binary() {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Backend that sends its headers and one chunk of a chunked body, then
/// drops the connection.
pub async fn start_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_none() {
                    return;
                }
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(100)).await;
            });
        }
    });
    addr
}

/// Send a WebSocket upgrade by hand, so the test controls exactly which
/// headers go out and sees the raw 101 head. Returns the head (lowercased)
/// and the socket, positioned at the first frame.
pub async fn raw_upgrade(addr: SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> (String, TcpStream) {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let mut request = format!(
        "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"
    );
    for (name, value) in extra_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    socket.write_all(request.as_bytes()).await.unwrap();

    // Byte at a time so no frame data is consumed with the head.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = socket.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed during handshake");
        head.push(byte[0]);
    }
    (String::from_utf8_lossy(&head).to_ascii_lowercase(), socket)
}
