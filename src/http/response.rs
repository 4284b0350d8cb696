//! Response value type and HTTP/1.1 response parsing.

use crate::base::neterror::NetError;
use crate::http::chunked;
use crate::http::decoding;
use crate::http::headermap::HeaderMap;
use bytes::Bytes;

/// Ceiling for the status line plus header section.
pub const MAX_HEADER_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    Http10,
    #[default]
    Http11,
    Http2,
}

/// Status line and headers of an HTTP/1.x response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: HttpVersion,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
}

/// How the body following a response head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    Empty,
    ContentLength(usize),
    Chunked,
    UntilClose,
}

impl ResponseHead {
    /// Parse a response head from the start of `buf`.
    ///
    /// Returns `Ok(None)` while the blank line ending the headers has not
    /// arrived yet, or the head and its length in bytes once it has.
    pub fn parse(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, NetError> {
        let Some(end) = find_head_end(buf) else {
            if buf.len() > MAX_HEADER_BYTES {
                return Err(NetError::ResponseHeadersTooBig);
            }
            return Ok(None);
        };
        if end > MAX_HEADER_BYTES {
            return Err(NetError::ResponseHeadersTooBig);
        }

        let text = std::str::from_utf8(&buf[..end]).map_err(|_| NetError::InvalidResponse)?;
        let mut lines = text.split("\r\n");
        let status_line = lines.next().ok_or(NetError::InvalidResponse)?;
        let (version, status, status_text) = parse_status_line(status_line)?;

        let mut headers = HeaderMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // Obsolete line folding.
                return Err(NetError::InvalidResponse);
            }
            let (name, value) = line.split_once(':').ok_or(NetError::InvalidResponse)?;
            if name.is_empty() || name.bytes().any(|b| b <= b' ' || b >= 0x7f) {
                return Err(NetError::InvalidResponse);
            }
            headers.append(name, value.trim());
        }

        Ok(Some((ResponseHead { version, status, status_text, headers }, end + 4)))
    }

    /// Determine body framing. `head_request` is true when the request
    /// method was HEAD.
    pub fn body_length(&self, head_request: bool) -> Result<BodyLength, NetError> {
        if head_request || (100..200).contains(&self.status) || self.status == 204 || self.status == 304 {
            return Ok(BodyLength::Empty);
        }
        if self.headers.has("transfer-encoding") {
            let chunked_last = self
                .headers
                .get_all("transfer-encoding")
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .last()
                .is_some_and(|t| t.eq_ignore_ascii_case("chunked"));
            return Ok(if chunked_last { BodyLength::Chunked } else { BodyLength::UntilClose });
        }
        let lengths = self.headers.get_all("content-length");
        if !lengths.is_empty() {
            let mut parsed = None;
            for raw in lengths.iter().flat_map(|v| v.split(',')) {
                let n: usize = raw.trim().parse().map_err(|_| NetError::InvalidResponse)?;
                if parsed.is_some_and(|p| p != n) {
                    return Err(NetError::ResponseHeadersMultipleContentLength);
                }
                parsed = Some(n);
            }
            let n = parsed.ok_or(NetError::InvalidResponse)?;
            return Ok(if n == 0 { BodyLength::Empty } else { BodyLength::ContentLength(n) });
        }
        Ok(BodyLength::UntilClose)
    }

    /// Whether the connection may carry another request afterwards.
    pub fn keep_alive(&self) -> bool {
        if self.headers.contains_token("connection", "close") {
            return false;
        }
        match self.version {
            HttpVersion::Http10 => self.headers.contains_token("connection", "keep-alive"),
            _ => true,
        }
    }
}

fn parse_status_line(line: &str) -> Result<(HttpVersion, u16, String), NetError> {
    let mut parts = line.splitn(3, ' ');
    let version = match parts.next() {
        Some(v) if v.eq_ignore_ascii_case("HTTP/1.1") => HttpVersion::Http11,
        Some(v) if v.eq_ignore_ascii_case("HTTP/1.0") => HttpVersion::Http10,
        _ => return Err(NetError::InvalidResponse),
    };
    let code = parts.next().ok_or(NetError::InvalidResponse)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NetError::InvalidResponse);
    }
    let status: u16 = code.parse().map_err(|_| NetError::InvalidResponse)?;
    if !(100..=599).contains(&status) {
        return Err(NetError::InvalidResponse);
    }
    let reason = parts.next().unwrap_or("").trim().to_string();
    Ok((version, status, reason))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// A received response. Only produced by parsing, or synthesized from a
/// cache entry.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub version: HttpVersion,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL after redirects.
    pub url: String,
    pub redirected: bool,
}

impl Response {
    /// Parse a complete HTTP/1.1 response held in memory.
    ///
    /// The body is delimited by `Content-Length`, else chunked coding, else
    /// the end of `buf`. Content codings are undone afterwards.
    pub fn parse(buf: &[u8]) -> Result<Response, NetError> {
        Self::parse_for(buf, false)
    }

    /// Like [`Response::parse`], for the reply to a HEAD request when
    /// `head_request` is set.
    pub fn parse_for(buf: &[u8], head_request: bool) -> Result<Response, NetError> {
        let (head, head_len) = ResponseHead::parse(buf)?.ok_or(NetError::InvalidResponse)?;
        let rest = &buf[head_len..];
        let raw_body: Bytes = match head.body_length(head_request)? {
            BodyLength::Empty => Bytes::new(),
            BodyLength::ContentLength(n) => {
                if rest.len() < n {
                    return Err(NetError::ContentLengthMismatch);
                }
                Bytes::copy_from_slice(&rest[..n])
            }
            BodyLength::Chunked => chunked::decode_all(rest)?.0.freeze(),
            BodyLength::UntilClose => Bytes::copy_from_slice(rest),
        };
        Self::from_parts(head, raw_body)
    }

    /// Assemble a response from a parsed head and its framed body, undoing
    /// any content coding.
    pub fn from_parts(head: ResponseHead, raw_body: Bytes) -> Result<Response, NetError> {
        let body = match head.headers.get("content-encoding") {
            Some(coding) if !raw_body.is_empty() => {
                Bytes::from(decoding::decode_body(coding, &raw_body)?)
            }
            _ => raw_body,
        };
        Ok(Response {
            status: head.status,
            status_text: head.status_text,
            version: head.version,
            headers: head.headers,
            body,
            url: String::new(),
            redirected: false,
        })
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("location")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_length() {
        let resp = Response::parse(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhelloEXTRA",
        )
        .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.status_text, "OK");
        assert_eq!(resp.headers.get("content-type"), Some("text/plain"));
        assert_eq!(&resp.body[..], b"hello");
    }

    #[test]
    fn test_parse_chunked() {
        let resp = Response::parse(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n0\r\n\r\n",
        )
        .unwrap();
        assert_eq!(resp.text(), "Wiki");
    }

    #[test]
    fn test_parse_until_close() {
        let resp = Response::parse(b"HTTP/1.0 200 OK\r\n\r\nall the rest").unwrap();
        assert_eq!(resp.version, HttpVersion::Http10);
        assert_eq!(resp.text(), "all the rest");
    }

    #[test]
    fn test_malformed_status_line() {
        assert_eq!(Response::parse(b"HTTX/1.1 200 OK\r\n\r\n").unwrap_err(), NetError::InvalidResponse);
        assert_eq!(Response::parse(b"HTTP/1.1 2000 OK\r\n\r\n").unwrap_err(), NetError::InvalidResponse);
        assert_eq!(Response::parse(b"HTTP/1.1 200 OK\r\nNoColon\r\n\r\n").unwrap_err(), NetError::InvalidResponse);
    }

    #[test]
    fn test_unterminated_head_and_chunks() {
        assert_eq!(Response::parse(b"HTTP/1.1 200 OK\r\n").unwrap_err(), NetError::InvalidResponse);
        assert_eq!(
            Response::parse(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n")
                .unwrap_err(),
            NetError::IncompleteChunkedEncoding
        );
    }

    #[test]
    fn test_headers_too_big() {
        let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
        while raw.len() <= MAX_HEADER_BYTES {
            raw.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        assert_eq!(Response::parse(&raw).unwrap_err(), NetError::ResponseHeadersTooBig);
    }

    #[test]
    fn test_conflicting_content_length() {
        let err = Response::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab")
            .unwrap_err();
        assert_eq!(err, NetError::ResponseHeadersMultipleContentLength);
    }

    #[test]
    fn test_no_body_statuses_and_head() {
        let resp = Response::parse(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n").unwrap();
        assert!(resp.body.is_empty());
        let resp = Response::parse_for(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n", true).unwrap();
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_gzip_body_is_decoded() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"compressed!").unwrap();
        let gz = enc.finish().unwrap();
        let mut raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
            gz.len()
        )
        .into_bytes();
        raw.extend_from_slice(&gz);
        assert_eq!(Response::parse(&raw).unwrap().text(), "compressed!");
    }

    #[test]
    fn test_corrupt_gzip_fails_parse() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 4\r\n\r\nnope";
        assert_eq!(Response::parse(raw).unwrap_err(), NetError::ContentDecodingFailed);
    }

    #[test]
    fn test_keep_alive_rules() {
        let head = |raw: &[u8]| ResponseHead::parse(raw).unwrap().unwrap().0;
        assert!(head(b"HTTP/1.1 200 OK\r\n\r\n").keep_alive());
        assert!(!head(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n").keep_alive());
        assert!(!head(b"HTTP/1.0 200 OK\r\n\r\n").keep_alive());
        assert!(head(b"HTTP/1.0 200 OK\r\nConnection: Keep-Alive\r\n\r\n").keep_alive());
    }

    #[test]
    fn test_head_parse_incomplete() {
        assert!(ResponseHead::parse(b"HTTP/1.1 200 OK\r\nA: b\r\n").unwrap().is_none());
    }
}
