//! Error taxonomy for the proxying pipeline.
//!
//! Every failure ends the client connection without a synthesized response;
//! the variants only differ in how they are logged and counted.

use thiserror::Error;

/// Errors raised while parsing, forwarding or relaying one connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Request line has fewer than three tokens or is not valid UTF-8.
    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    /// Request method is not in the allow-list.
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Header line without a colon, or with whitespace inside its name.
    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Stream ended before a single byte of the message arrived.
    #[error("Connection closed before a message was received")]
    ConnectionClosed,

    /// Stream ended inside a header block.
    #[error("Stream ended before the end of the header block")]
    TruncatedMessage,

    /// Header block grew past the configured limit.
    #[error("Header block exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    /// Backend could not be dialed, timed out, or failed the TLS handshake.
    #[error("Backend {address} unavailable: {source}")]
    BackendUnavailable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to either peer failed after the backend
    /// connection was established.
    #[error("Relay I/O error: {0}")]
    RelayIo(#[source] std::io::Error),

    /// Reading the client stream failed while parsing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequestLine(_) => "malformed_request_line",
            ProxyError::UnsupportedMethod(_) => "unsupported_method",
            ProxyError::MalformedHeader(_) => "malformed_header",
            ProxyError::ConnectionClosed => "connection_closed",
            ProxyError::TruncatedMessage => "truncated_message",
            ProxyError::HeaderTooLarge { .. } => "header_too_large",
            ProxyError::BackendUnavailable { .. } => "backend_unavailable",
            ProxyError::RelayIo(_) => "relay_io",
            ProxyError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(ProxyError::UnsupportedMethod("FOO".into()).kind(), "unsupported_method");
        assert_eq!(ProxyError::TruncatedMessage.kind(), "truncated_message");
        assert_eq!(
            ProxyError::RelayIo(std::io::ErrorKind::BrokenPipe.into()).kind(),
            "relay_io"
        );
    }

    #[test]
    fn backend_unavailable_names_the_address() {
        let err = ProxyError::BackendUnavailable {
            address: "10.0.0.1:80".into(),
            source: std::io::ErrorKind::ConnectionRefused.into(),
        };
        assert!(err.to_string().contains("10.0.0.1:80"));
        assert_eq!(err.kind(), "backend_unavailable");
    }
}
