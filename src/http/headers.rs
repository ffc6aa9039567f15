//! Header block codec.
//!
//! Header names are canonicalized to `Title-Case-With-Hyphens` on every
//! insert and lookup, so `content-type`, `CONTENT-TYPE` and `Content-Type`
//! address the same entry. Each name holds one value; a repeated header line
//! overwrites the previous one.

use indexmap::IndexMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ProxyError;

/// Case-normalized header mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a header.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(canonicalize(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&canonicalize(name)).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonicalize(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.shift_remove(&canonicalize(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append every entry as `Name: value\r\n`, without the closing blank line.
    pub fn write_fields(&self, out: &mut String) {
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
    }

    /// Serialize the whole header block, closing blank line included.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        self.write_fields(&mut out);
        out.push_str("\r\n");
        out
    }
}

/// Canonical header name: spaces become hyphens, then each hyphen-delimited
/// segment is lower-cased with its first letter upper-cased.
pub fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment_start = true;
    for c in name.chars() {
        let c = if c == ' ' { '-' } else { c };
        if c == '-' {
            out.push('-');
            segment_start = true;
        } else if segment_start {
            out.extend(c.to_uppercase());
            segment_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Split one header line into its canonical name and trimmed value.
pub fn parse_header_line(line: &str) -> Result<(String, String), ProxyError> {
    let (raw_name, value) = line
        .split_once(':')
        .ok_or_else(|| ProxyError::MalformedHeader(line.to_string()))?;
    let raw_name = raw_name.trim();
    if raw_name.is_empty() || raw_name.chars().any(char::is_whitespace) {
        return Err(ProxyError::MalformedHeader(line.to_string()));
    }
    Ok((canonicalize(raw_name), value.trim().to_string()))
}

/// Byte budget shared by every line of one message head.
#[derive(Debug, Clone, Copy)]
pub struct HeadLimit {
    limit: usize,
    remaining: usize,
}

impl HeadLimit {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    /// Read the next line with its terminator stripped.
    ///
    /// `Ok(None)` means the stream ended before any byte of this line.
    pub async fn read_line<R>(&mut self, reader: &mut R) -> Result<Option<String>, ProxyError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let n = (&mut *reader)
            .take(self.remaining as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        self.remaining -= n;

        if buf.last() != Some(&b'\n') {
            if self.remaining == 0 {
                return Err(ProxyError::HeaderTooLarge { limit: self.limit });
            }
            if n == 0 {
                return Ok(None);
            }
            return Err(ProxyError::TruncatedMessage);
        }

        let line = String::from_utf8(buf)
            .map_err(|e| ProxyError::MalformedHeader(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Read header lines up to and including the blank line that ends the block.
pub async fn read_headers<R>(reader: &mut R, limit: &mut HeadLimit) -> Result<Headers, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Headers::new();
    loop {
        let line = limit
            .read_line(reader)
            .await?
            .ok_or(ProxyError::TruncatedMessage)?;
        if line.is_empty() {
            return Ok(headers);
        }
        let (name, value) = parse_header_line(&line)?;
        headers.entries.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(raw: &str) -> Result<Headers, ProxyError> {
        let mut reader = BufReader::new(raw.as_bytes());
        read_headers(&mut reader, &mut HeadLimit::new(1024)).await
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonicalize("content-type"), "Content-Type");
        assert_eq!(canonicalize("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonicalize("x-forwarded-for"), "X-Forwarded-For");
        assert_eq!(canonicalize("user agent"), "User-Agent");
        assert_eq!(canonicalize("host"), "Host");
    }

    #[test]
    fn colon_inside_value_is_kept() {
        let (name, value) = parse_header_line("host: example.com:8080").unwrap();
        assert_eq!(name, "Host");
        assert_eq!(value, "example.com:8080");
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(matches!(
            parse_header_line("no colon here"),
            Err(ProxyError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse_header_line("Bad Name: x"),
            Err(ProxyError::MalformedHeader(_))
        ));
        assert!(matches!(parse_header_line(": x"), Err(ProxyError::MalformedHeader(_))));
    }

    #[tokio::test]
    async fn spacing_and_case_normalize_identically() {
        let a = parse("content-type: X\r\n\r\n").await.unwrap();
        let b = parse("Content-Type:   X\r\n\r\n").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("CONTENT-TYPE"), Some("X"));
    }

    #[tokio::test]
    async fn last_duplicate_wins() {
        let headers = parse("Accept: a\r\naccept: b\r\n\r\n").await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept"), Some("b"));
    }

    #[tokio::test]
    async fn bare_newlines_are_accepted() {
        let headers = parse("Host: x\n\n").await.unwrap();
        assert_eq!(headers.get("host"), Some("x"));
    }

    #[tokio::test]
    async fn stops_at_blank_line() {
        let mut reader = BufReader::new("Host: x\r\n\r\nbody".as_bytes());
        read_headers(&mut reader, &mut HeadLimit::new(1024)).await.unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "body");
    }

    #[tokio::test]
    async fn eof_before_blank_line_is_truncated() {
        assert!(matches!(parse("Host: x\r\n").await, Err(ProxyError::TruncatedMessage)));
        assert!(matches!(parse("Host: x").await, Err(ProxyError::TruncatedMessage)));
        assert!(matches!(parse("").await, Err(ProxyError::TruncatedMessage)));
    }

    #[tokio::test]
    async fn oversized_block_is_rejected() {
        let raw = format!("X-Big: {}\r\n\r\n", "a".repeat(64));
        let mut reader = BufReader::new(raw.as_bytes());
        let err = read_headers(&mut reader, &mut HeadLimit::new(32)).await.unwrap_err();
        assert!(matches!(err, ProxyError::HeaderTooLarge { limit: 32 }));
    }

    #[tokio::test]
    async fn round_trip_preserves_every_pair() {
        let headers = parse("host: a\r\nX-ID:  7 \r\ncookie: k=v; j=w\r\n\r\n").await.unwrap();
        let wire = headers.to_wire();
        assert!(wire.ends_with("\r\n\r\n"));
        let reparsed = parse(&wire).await.unwrap();
        assert_eq!(reparsed, headers);
        assert_eq!(reparsed.get("x-id"), Some("7"));
        assert_eq!(reparsed.get("Cookie"), Some("k=v; j=w"));
    }
}
