//! Listener manager.
//!
//! # Responsibilities
//! - Bind the plaintext and TLS-terminating listeners independently
//! - Run one accept loop per listener
//! - Spawn one task per accepted connection running the dispatcher
//! - Stop accepting on shutdown and wait for in-flight connections
//!
//! A listener that fails to bind, or whose certificate cannot be loaded, is
//! logged and skipped. Startup only fails when no listener is available.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::dispatch::{Dispatcher, DispatcherError};
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::Listener;
use crate::net::tls;
use crate::observability::metrics;

/// Fatal startup conditions.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    #[error("No listener could be started")]
    NoListener,
}

/// Which accept loop a connection came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Http,
    Https,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Http => "http",
            ListenerKind::Https => "https",
        }
    }
}

/// The proxy before its listeners are bound.
pub struct ProxyServer {
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
        for (index, backend) in dispatcher.registry().iter().enumerate() {
            tracing::info!(index, backend = %backend, "Backend registered");
        }
        Ok(Self {
            config,
            dispatcher,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Bind every configured listener that can be bound.
    pub async fn bind(self) -> Result<BoundServer, StartupError> {
        let listener_config = &self.config.listener;

        let http = match Listener::bind(&listener_config.http_address, listener_config.max_connections).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::error!(
                    address = %listener_config.http_address,
                    error = %e,
                    "HTTP listener failed to start"
                );
                None
            }
        };

        let https = match &listener_config.https {
            Some(https) => {
                let bound = async {
                    let acceptor = tls::load_acceptor(Path::new(&https.cert_path), Path::new(&https.key_path))
                        .map_err(|e| e.to_string())?;
                    let listener = Listener::bind(&https.bind_address, listener_config.max_connections)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok::<_, String>((listener, acceptor))
                };
                match bound.await {
                    Ok(pair) => Some(pair),
                    Err(error) => {
                        tracing::error!(
                            address = %https.bind_address,
                            error = %error,
                            "HTTPS listener failed to start"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        if http.is_none() && https.is_none() {
            return Err(StartupError::NoListener);
        }

        Ok(BoundServer {
            http,
            https,
            dispatcher: self.dispatcher,
            tracker: self.tracker,
            drain_timeout: Duration::from_secs(self.config.lifecycle.drain_timeout_secs),
        })
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), StartupError> {
        self.bind().await?.serve(shutdown).await;
        Ok(())
    }
}

/// The proxy with its listeners bound, ready to accept.
pub struct BoundServer {
    http: Option<Listener>,
    https: Option<(Listener, TlsAcceptor)>,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl BoundServer {
    /// Address of the plaintext listener, if it started.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the TLS listener, if it started.
    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https.as_ref().and_then(|(l, _)| l.local_addr().ok())
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Run the accept loops until `shutdown` fires, then drain connections.
    pub async fn serve(self, shutdown: Shutdown) {
        let mut loops = JoinSet::new();

        if let Some(listener) = self.http {
            loops.spawn(accept_loop(
                listener,
                None,
                self.dispatcher.clone(),
                self.tracker.clone(),
                shutdown.subscribe(),
            ));
        }
        if let Some((listener, acceptor)) = self.https {
            loops.spawn(accept_loop(
                listener,
                Some(acceptor),
                self.dispatcher.clone(),
                self.tracker.clone(),
                shutdown.subscribe(),
            ));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Accept loop terminated abnormally");
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, timeout = ?self.drain_timeout, "Draining connections");
            if !self.tracker.wait_for_drain(self.drain_timeout).await {
                tracing::warn!(
                    remaining = self.tracker.active_count(),
                    "Drain timeout elapsed with connections still open"
                );
            }
        }
        tracing::info!("Proxy server stopped");
    }
}

/// Accept connections until shutdown, one task per connection.
async fn accept_loop(
    listener: Listener,
    tls: Option<TlsAcceptor>,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    mut shutdown: broadcast::Receiver<()>,
) {
    let kind = if tls.is_some() {
        ListenerKind::Https
    } else {
        ListenerKind::Http
    };
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(listener = kind.as_str(), address = %addr, "Accepting connections");
    }

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.recv() => {
                tracing::info!(listener = kind.as_str(), "Shutdown signal received, stopping accept loop");
                break;
            }
        };

        let (stream, peer_addr, permit) = match accepted {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(listener = kind.as_str(), error = %e, "Accept failed");
                continue;
            }
        };

        let guard = tracker.track();
        metrics::record_connection(kind.as_str());

        let span = tracing::info_span!(
            "connection",
            connection_id = %guard.id(),
            listener = kind.as_str(),
            peer_addr = %peer_addr,
        );
        let dispatcher = dispatcher.clone();
        let tls = tls.clone();

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => dispatcher.serve(tls_stream).await,
                        Err(e) => {
                            tracing::debug!(error = %e, "TLS handshake failed");
                            metrics::record_error("tls_handshake");
                        }
                    },
                    None => dispatcher.serve(stream).await,
                }
            }
            .instrument(span),
        );
    }
}
