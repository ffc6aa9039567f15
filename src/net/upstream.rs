//! Backend connection and request forwarding.
//!
//! # Responsibilities
//! - Dial a backend over plain TCP or TLS, per its descriptor
//! - Rewrite the request head for the backend (Host, version, Connection)
//! - Send the request head and hand the live stream back to the caller
//!
//! Every forwarded request opens a fresh backend connection; nothing is
//! pooled. The caller owns the returned stream and closes it by dropping.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::{ForwardingConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::http::request::{Request, FORWARDED_VERSION};
use crate::load_balancer::backend::Backend;
use crate::net::tls::{self, TlsError};

/// A bidirectional byte stream to a peer.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Backend connection, plaintext or TLS.
pub type BackendStream = Box<dyn Stream>;

/// Opens backend connections and sends request heads.
#[derive(Clone)]
pub struct Forwarder {
    connector: TlsConnector,
    connect_timeout: Option<Duration>,
    forwarding: ForwardingConfig,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("connect_timeout", &self.connect_timeout)
            .field("forwarding", &self.forwarding)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    pub fn new(connector: TlsConnector, connect_timeout: Option<Duration>, forwarding: ForwardingConfig) -> Self {
        Self {
            connector,
            connect_timeout,
            forwarding,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, TlsError> {
        let connector = tls::backend_connector(config.backend_tls.verify_certificates)?;
        let connect_timeout = match config.timeouts.connect_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Ok(Self::new(connector, connect_timeout, config.forwarding.clone()))
    }

    /// Connect to `backend` and send the rewritten request head.
    pub async fn forward(&self, request: &mut Request, backend: &Backend) -> Result<BackendStream, ProxyError> {
        let mut stream = self.connect(backend).await?;

        self.rewrite(request, backend);
        let head = request.to_wire();
        stream.write_all(head.as_bytes()).await.map_err(ProxyError::RelayIo)?;
        stream.flush().await.map_err(ProxyError::RelayIo)?;

        tracing::debug!(
            backend = %backend,
            method = %request.method,
            path = %request.path,
            head_bytes = head.len(),
            "Request head forwarded"
        );
        Ok(stream)
    }

    /// Open a plain or TLS connection to `backend`.
    pub async fn connect(&self, backend: &Backend) -> Result<BackendStream, ProxyError> {
        let address = backend.dial_address();
        let dial = self.dial(backend, &address);
        let result = match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, dial).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", limit),
                )),
            },
            None => dial.await,
        };
        result.map_err(|source| ProxyError::BackendUnavailable { address, source })
    }

    async fn dial(&self, backend: &Backend, address: &str) -> Result<BackendStream, std::io::Error> {
        let tcp = TcpStream::connect(address).await?;
        tcp.set_nodelay(true)?;
        if !backend.is_https {
            return Ok(Box::new(tcp));
        }
        let name = tls::server_name(backend.host())?;
        let stream = self.connector.connect(name, tcp).await?;
        Ok(Box::new(stream))
    }

    /// Point the request at `backend`.
    ///
    /// `Host` becomes the backend hostname and the version is pinned to
    /// HTTP/1.1. `Connection: close` makes the backend end the response by
    /// closing. `User-Agent` and `Accept` get defaults when absent.
    pub fn rewrite(&self, request: &mut Request, backend: &Backend) {
        request.version = FORWARDED_VERSION.to_string();
        request.headers.insert("Host", backend.host());
        request.headers.insert("Connection", "close");
        if !request.headers.contains("User-Agent") {
            request.headers.insert("User-Agent", self.forwarding.user_agent.clone());
        }
        if !request.headers.contains("Accept") {
            request.headers.insert("Accept", self.forwarding.accept.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::headers::Headers;
    use crate::http::request::Method;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn forwarder() -> Forwarder {
        let mut config = ProxyConfig::default();
        config.timeouts.connect_secs = 2;
        Forwarder::from_config(&config).unwrap()
    }

    fn request(version: &str, headers: &[(&str, &str)]) -> Request {
        let mut map = Headers::new();
        for (k, v) in headers {
            map.insert(k, *v);
        }
        Request {
            method: Method::Get,
            path: "/index".into(),
            version: version.into(),
            headers: map,
        }
    }

    #[test]
    fn rewrite_points_request_at_backend() {
        let mut req = request("HTTP/1.0", &[("Host", "x"), ("Connection", "keep-alive"), ("X-Id", "7")]);
        forwarder().rewrite(&mut req, &Backend::new("backend.local:8080", false));

        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.headers.get("Host"), Some("backend.local"));
        assert_eq!(req.headers.get("Connection"), Some("close"));
        assert_eq!(req.headers.get("User-Agent"), Some("sticky-proxy"));
        assert_eq!(req.headers.get("Accept"), Some("*/*"));
        assert_eq!(req.headers.get("X-Id"), Some("7"));
    }

    #[test]
    fn rewrite_keeps_client_user_agent_and_accept() {
        let mut req = request("HTTP/1.1", &[("User-Agent", "curl/8"), ("Accept", "text/html")]);
        forwarder().rewrite(&mut req, &Backend::new("b", false));
        assert_eq!(req.headers.get("User-Agent"), Some("curl/8"));
        assert_eq!(req.headers.get("Accept"), Some("text/html"));
    }

    #[tokio::test]
    async fn forward_writes_request_head() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).await.unwrap();
            received
        });

        let mut req = request("HTTP/1.0", &[("Host", "x")]);
        let stream = forwarder()
            .forward(&mut req, &Backend::new(addr.to_string(), false))
            .await
            .unwrap();
        drop(stream);

        let received = server.await.unwrap();
        assert!(received.starts_with("GET /index HTTP/1.1\r\n"), "{received}");
        assert!(received.contains("Host: 127.0.0.1\r\n"));
        assert!(received.contains("Connection: close\r\n"));
        assert!(received.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let mut req = request("HTTP/1.1", &[]);
        let err = forwarder()
            .forward(&mut req, &Backend::new(addr.to_string(), false))
            .await
            .err().expect("expected error");
        match err {
            ProxyError::BackendUnavailable { address, .. } => assert_eq!(address, addr.to_string()),
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
        // The head is only rewritten once a connection exists.
        assert_eq!(req.headers.get("Host"), None);
    }

    #[tokio::test]
    async fn tls_handshake_failure_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });

        let mut req = request("HTTP/1.1", &[]);
        let err = forwarder()
            .forward(&mut req, &Backend::new(addr.to_string(), true))
            .await
            .err().expect("expected error");
        assert!(matches!(err, ProxyError::BackendUnavailable { .. }));
    }
}
