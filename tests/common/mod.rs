//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sticky_proxy::config::{BackendConfig, ProxyConfig};
use sticky_proxy::http::ProxyServer;
use sticky_proxy::lifecycle::Shutdown;

/// A plain-TCP backend that answers every request with its own name.
pub struct MockBackend {
    pub addr: SocketAddr,
    /// Request heads as received, one per connection.
    pub heads: mpsc::UnboundedReceiver<String>,
}

impl MockBackend {
    /// Next request head seen by this backend.
    pub async fn next_head(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.heads.recv())
            .await
            .expect("backend saw no request")
            .expect("backend stopped")
    }
}

/// Start a mock backend whose response body is `name`.
pub async fn start_backend(name: &'static str) -> MockBackend {
    start_slow_backend(name, Duration::ZERO).await
}

/// Start a mock backend that waits `delay` before answering.
pub async fn start_slow_backend(name: &'static str, delay: Duration) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, heads) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    match socket.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            head.push_str(&line);
                            if line == "\r\n" {
                                break;
                            }
                        }
                    }
                }
                let _ = tx.send(head);

                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                    name.len(),
                    name
                );
                let _ = socket.get_mut().write_all(response.as_bytes()).await;
                let _ = socket.get_mut().shutdown().await;
            });
        }
    });

    MockBackend { addr, heads }
}

/// An address nothing is listening on.
pub async fn dead_address() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap()
}

/// Proxy config with an ephemeral HTTP listener and the given backends.
pub fn config_for(backends: &[SocketAddr]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.http_address = "127.0.0.1:0".into();
    config.lifecycle.drain_timeout_secs = 5;
    config.backends = backends
        .iter()
        .map(|addr| BackendConfig {
            address: addr.to_string(),
            https: false,
        })
        .collect();
    config
}

/// A running proxy.
pub struct TestProxy {
    pub http: SocketAddr,
    pub https: Option<SocketAddr>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let bound = ProxyServer::new(config).unwrap().bind().await.unwrap();
    let http = bound.http_addr().expect("http listener not bound");
    let https = bound.https_addr();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));
    TestProxy {
        http,
        https,
        shutdown,
        handle,
    }
}

/// Send raw bytes to `addr` and collect everything until the proxy closes.
pub async fn send_raw(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The proxy may close before reading everything; that is the point of
    // some tests.
    let _ = stream.write_all(request.as_bytes()).await;
    let _ = stream.shutdown().await;
    read_until_closed(stream).await
}

/// Read until EOF or reset, failing the test if the peer never closes.
pub async fn read_until_closed<S: AsyncRead + Unpin>(mut stream: S) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    let read = async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("proxy did not close the connection");
    String::from_utf8_lossy(&out).into_owned()
}

/// Value of the affinity cookie set by a raw response, if any.
pub fn affinity_cookie(response: &str) -> Option<String> {
    response
        .split("\r\n")
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.strip_prefix("Set-Cookie: LB_NODE="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
        .next()
}

/// Response body of a raw response.
pub fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or_default()
}
