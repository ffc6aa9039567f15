//! Per-connection pipeline: parse → select → forward → relay.
//!
//! A dispatcher is shared read-only by every connection task. Each call to
//! [`Dispatcher::handle`] owns one client stream and at most one backend
//! stream; both are closed when it returns, on every path.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{parse_request, Method};
use crate::http::response::relay_response;
use crate::load_balancer::backend::{BackendRegistry, EmptyRegistry};
use crate::load_balancer::sticky::StickySelector;
use crate::net::tls::TlsError;
use crate::net::upstream::Forwarder;
use crate::observability::metrics;

/// Errors building a dispatcher from configuration.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Registry(#[from] EmptyRegistry),

    #[error("Backend TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

/// Summary of one proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub method: Method,
    pub path: String,
    pub backend_index: usize,
    /// The client presented a valid affinity cookie.
    pub sticky: bool,
    pub status_line: String,
    pub request_body_bytes: u64,
    pub response_body_bytes: u64,
}

/// Runs the proxy pipeline for accepted connections.
#[derive(Debug)]
pub struct Dispatcher {
    registry: BackendRegistry,
    selector: StickySelector,
    forwarder: Forwarder,
    max_header_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        registry: BackendRegistry,
        selector: StickySelector,
        forwarder: Forwarder,
        max_header_bytes: usize,
    ) -> Self {
        Self {
            registry,
            selector,
            forwarder,
            max_header_bytes,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, DispatcherError> {
        Ok(Self::new(
            BackendRegistry::from_config(&config.backends)?,
            StickySelector::new(&config.affinity),
            Forwarder::from_config(config)?,
            config.limits.max_header_bytes,
        ))
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Serve one connection and log the outcome.
    pub async fn serve<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let started = Instant::now();
        match self.handle(stream).await {
            Ok(exchange) => {
                let backend = &self.registry[exchange.backend_index];
                tracing::info!(
                    method = %exchange.method,
                    path = %exchange.path,
                    backend = %backend,
                    sticky = exchange.sticky,
                    status = %exchange.status_line,
                    request_bytes = exchange.request_body_bytes,
                    response_bytes = exchange.response_body_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Request proxied"
                );
                metrics::record_request(&backend.address, exchange.sticky, exchange.response_body_bytes);
            }
            Err(err @ ProxyError::ConnectionClosed) => {
                tracing::trace!(error = %err, "Client closed without sending a request");
            }
            Err(err @ ProxyError::BackendUnavailable { .. }) => {
                tracing::warn!(error = %err, "Backend unavailable, closing client connection");
                metrics::record_error(err.kind());
            }
            Err(err) => {
                tracing::debug!(error = %err, kind = err.kind(), "Connection aborted");
                metrics::record_error(err.kind());
            }
        }
    }

    /// Run the full pipeline on one client stream.
    ///
    /// No response is synthesized on failure: the client stream is dropped,
    /// which closes it.
    pub async fn handle<S>(&self, stream: S) -> Result<Exchange, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut client = BufReader::new(stream);
        let mut request = parse_request(&mut client, self.max_header_bytes).await?;

        let affinity = {
            let mut rng = rand::thread_rng();
            self.selector.select(&request.headers, self.registry.len(), &mut rng)
        };
        let backend = &self.registry[affinity.index];
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            backend = %backend,
            sticky = affinity.found_existing,
            "Backend selected"
        );

        let backend_stream = self.forwarder.forward(&mut request, backend).await?;
        let set_cookie = affinity
            .must_set_cookie()
            .then(|| self.selector.set_cookie_value(affinity.index));

        let (backend_rd, mut backend_wr) = tokio::io::split(backend_stream);
        let (mut client_rd, mut client_wr) = tokio::io::split(client);

        // Body bytes flow upstream while the response flows back; the upload
        // is abandoned once the response is complete.
        let (outcome, request_body_bytes) = {
            let upload = tokio::io::copy(&mut client_rd, &mut backend_wr);
            let relay = relay_response(backend_rd, &mut client_wr, set_cookie.as_deref(), self.max_header_bytes);
            tokio::pin!(upload, relay);

            let mut request_body_bytes = 0;
            let mut upload_done = false;
            let outcome = loop {
                tokio::select! {
                    result = &mut relay => break result?,
                    result = &mut upload, if !upload_done => {
                        upload_done = true;
                        match result {
                            Ok(n) => request_body_bytes = n,
                            Err(e) => tracing::debug!(error = %e, "Request body upload stopped"),
                        }
                    }
                }
            };
            (outcome, request_body_bytes)
        };

        if let Err(e) = client_wr.shutdown().await {
            tracing::debug!(error = %e, "Client shutdown failed");
        }

        Ok(Exchange {
            method: request.method,
            path: request.path,
            backend_index: affinity.index,
            sticky: affinity.found_existing,
            status_line: outcome.status_line,
            request_body_bytes,
            response_body_bytes: outcome.body_bytes,
        })
    }
}
