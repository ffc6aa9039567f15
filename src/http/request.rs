//! Request head parsing.
//!
//! Only the request line and header block are consumed. Whatever follows the
//! blank line stays in the reader and is later relayed to the backend as an
//! opaque body.

use std::fmt;
use std::str::FromStr;

use tokio::io::AsyncBufRead;

use crate::error::ProxyError;
use crate::http::headers::{read_headers, HeadLimit, Headers};

/// Protocol version sent to every backend, whatever the client used.
pub const FORWARDED_VERSION: &str = "HTTP/1.1";

/// Methods the proxy accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl FromStr for Method {
    type Err = ProxyError;

    /// Method tokens are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIONS" => Ok(Method::Options),
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            other => Err(ProxyError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Request target, passed through unvalidated.
    pub path: String,
    /// Version token as the client sent it.
    pub version: String,
    pub headers: Headers,
}

impl Request {
    /// Serialize request line and header block.
    pub fn to_wire(&self) -> String {
        let mut out = format!("{} {} {}\r\n", self.method, self.path, self.version);
        self.headers.write_fields(&mut out);
        out.push_str("\r\n");
        out
    }
}

/// Parse the request line and headers from the front of a client stream.
///
/// On success the reader is positioned at the first body byte.
pub async fn parse_request<R>(reader: &mut R, max_header_bytes: usize) -> Result<Request, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut limit = HeadLimit::new(max_header_bytes);
    let line = limit
        .read_line(reader)
        .await
        .map_err(|e| match e {
            ProxyError::MalformedHeader(raw) => ProxyError::MalformedRequestLine(raw),
            other => other,
        })?
        .ok_or(ProxyError::ConnectionClosed)?;

    let (method, path, version) = parse_request_line(&line)?;
    let headers = read_headers(reader, &mut limit).await?;

    Ok(Request {
        method,
        path,
        version,
        headers,
    })
}

/// Split a request line into method, target and version.
///
/// Tokens beyond the third are ignored.
pub fn parse_request_line(line: &str) -> Result<(Method, String, String), ProxyError> {
    let mut tokens = line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Err(ProxyError::MalformedRequestLine(line.to_string()));
    };
    let method = method.parse::<Method>()?;
    Ok((method, path.to_string(), version.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    async fn parse(raw: &[u8]) -> Result<Request, ProxyError> {
        parse_request(&mut BufReader::new(raw), 8 * 1024).await
    }

    #[tokio::test]
    async fn parses_a_get() {
        let req = parse(b"GET /index HTTP/1.0\r\nHost: x\r\naccept: */*\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index");
        assert_eq!(req.version, "HTTP/1.0");
        assert_eq!(req.headers.get("Host"), Some("x"));
        assert_eq!(req.headers.get("Accept"), Some("*/*"));
    }

    #[tokio::test]
    async fn leaves_body_in_reader() {
        let mut reader = BufReader::new(&b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello"[..]);
        let req = parse_request(&mut reader, 1024).await.unwrap();
        assert_eq!(req.method, Method::Post);

        let mut body = String::new();
        reader.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn two_tokens_is_malformed() {
        assert!(matches!(parse(b"GET /\r\n\r\n").await, Err(ProxyError::MalformedRequestLine(_))));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        match parse(b"FOO / HTTP/1.1\r\n\r\n").await {
            Err(ProxyError::UnsupportedMethod(m)) => assert_eq!(m, "FOO"),
            other => panic!("expected UnsupportedMethod, got {other:?}"),
        }
        assert!(matches!(
            parse(b"get / HTTP/1.1\r\n\r\n").await,
            Err(ProxyError::UnsupportedMethod(_))
        ));
    }

    #[tokio::test]
    async fn empty_stream_is_connection_closed() {
        assert!(matches!(parse(b"").await, Err(ProxyError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn header_errors_propagate() {
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nbroken\r\n\r\n").await,
            Err(ProxyError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nHost: x\r\n").await,
            Err(ProxyError::TruncatedMessage)
        ));
    }

    #[tokio::test]
    async fn extra_request_line_tokens_are_ignored() {
        let req = parse(b"PUT /a HTTP/1.1 trailing\r\n\r\n").await.unwrap();
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.version, "HTTP/1.1");
    }

    #[test]
    fn every_allowed_method_round_trips() {
        for m in ["OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT"] {
            assert_eq!(m.parse::<Method>().unwrap().as_str(), m);
        }
    }

    #[test]
    fn to_wire_starts_with_request_line() {
        let mut headers = Headers::new();
        headers.insert("host", "backend");
        let req = Request {
            method: Method::Get,
            path: "/x".into(),
            version: FORWARDED_VERSION.into(),
            headers,
        };
        assert_eq!(req.to_wire(), "GET /x HTTP/1.1\r\nHost: backend\r\n\r\n");
    }
}
