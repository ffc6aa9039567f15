//! Response relay from backend to client.
//!
//! The backend's status line is passed through untouched. Its headers are
//! re-serialized with `Connection: close` forced, plus the affinity cookie
//! when one has to be issued. The body is streamed verbatim until the
//! backend closes.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::ProxyError;
use crate::http::headers::{read_headers, HeadLimit};

/// What was relayed for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Backend status line, terminator stripped.
    pub status_line: String,
    /// Body bytes copied after the header block.
    pub body_bytes: u64,
}

/// Relay one response from `backend` to `client`.
///
/// `set_cookie` is written as an extra `Set-Cookie` line after the
/// backend's own headers. The client stream is flushed but not shut down.
pub async fn relay_response<B, C>(
    backend: B,
    client: &mut C,
    set_cookie: Option<&str>,
    max_header_bytes: usize,
) -> Result<RelayOutcome, ProxyError>
where
    B: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    let mut backend = BufReader::new(backend);
    let mut limit = HeadLimit::new(max_header_bytes);

    let status_line = limit
        .read_line(&mut backend)
        .await
        .map_err(into_relay_error)?
        .ok_or_else(|| {
            ProxyError::RelayIo(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "backend closed before sending a status line",
            ))
        })?;
    let mut headers = read_headers(&mut backend, &mut limit)
        .await
        .map_err(into_relay_error)?;

    headers.insert("Connection", "close");

    let mut head = String::with_capacity(status_line.len() + 256);
    head.push_str(&status_line);
    head.push_str("\r\n");
    headers.write_fields(&mut head);
    if let Some(cookie) = set_cookie {
        head.push_str("Set-Cookie: ");
        head.push_str(cookie);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    client.write_all(head.as_bytes()).await.map_err(ProxyError::RelayIo)?;
    let body_bytes = tokio::io::copy_buf(&mut backend, client)
        .await
        .map_err(ProxyError::RelayIo)?;
    client.flush().await.map_err(ProxyError::RelayIo)?;

    Ok(RelayOutcome {
        status_line,
        body_bytes,
    })
}

/// Read failures on the backend side belong to the relay stage.
fn into_relay_error(err: ProxyError) -> ProxyError {
    match err {
        ProxyError::Io(e) => ProxyError::RelayIo(e),
        other => other,
    }
}
