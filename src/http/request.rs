//! Request value type and HTTP/1.1 request serialization.

use crate::base::neterror::NetError;
use crate::http::headermap::HeaderMap;
use bytes::Bytes;
use http::Method;
use std::fmt;
use url::Url;

/// Transport security of a request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether credentials (cookies, `Authorization`) accompany a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Never send credentials.
    Omit,
    /// Send credentials only to the requesting origin.
    #[default]
    SameOrigin,
    /// Credentials were explicitly requested, cross-origin included.
    Include,
}

/// An outgoing request. The target arrives already split into parts by the
/// URL collaborator; this type never re-parses a URL string.
#[derive(Debug, Clone)]
pub struct Request {
    url: Url,
    pub method: Method,
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub credentials: CredentialsMode,
    /// Set for top-level document navigations (relaxes `SameSite=Lax`).
    pub top_level_navigation: bool,
}

impl Request {
    /// Build a request from a structured URL.
    ///
    /// Hosts must already be normalized ASCII; anything else is rejected
    /// rather than guessed at.
    pub fn new(method: Method, url: &Url) -> Result<Self, NetError> {
        let scheme = Scheme::from_str_opt(url.scheme()).ok_or(NetError::UnknownUrlScheme)?;
        let host = match url.host() {
            Some(url::Host::Ipv6(addr)) => format!("[{addr}]"),
            Some(host) => host.to_string(),
            None => return Err(NetError::InvalidUrl),
        };
        validate_host(&host)?;
        // Fragments never leave the client.
        let mut target = url.clone();
        target.set_fragment(None);

        Ok(Self {
            url: target,
            method,
            scheme,
            host: host.to_ascii_lowercase(),
            port: url.port().unwrap_or_else(|| scheme.default_port()),
            path: if url.path().is_empty() { "/".to_string() } else { url.path().to_string() },
            query: url.query().map(str::to_string),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            credentials: CredentialsMode::default(),
            top_level_navigation: false,
        })
    }

    pub fn get(url: &Url) -> Result<Self, NetError> {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_credentials(mut self, mode: CredentialsMode) -> Self {
        self.credentials = mode;
        self
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }

    /// The structured URL this request was built from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `path?query`, as sent on the request line.
    pub fn target(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        match &self.query {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        }
    }

    /// Host, plus the port when it is not the scheme default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `scheme://authority/path?query`, for reporting and redirect resolution.
    pub fn url_string(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), self.target())
    }

    /// Reject header names or values that would break HTTP/1.1 framing, and
    /// a caller-supplied `Host` that is not plain ASCII.
    pub fn validate_headers(&self) -> Result<(), NetError> {
        for (name, value) in self.headers.iter() {
            let bad_name = name.is_empty()
                || name
                    .bytes()
                    .any(|b| b <= b' ' || b == b':' || b >= 0x7f);
            let bad_value = value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0);
            if bad_name || bad_value {
                return Err(NetError::InvalidArgument);
            }
            if name == "host" {
                validate_host(value)?;
            }
        }
        validate_host(&self.host)
    }

    /// Serialize as an HTTP/1.1 request.
    ///
    /// `Host` is synthesized when absent, and so is `Content-Length` whenever
    /// a body is present.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target().as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        if !self.headers.has("host") {
            push_header(&mut out, "Host", &self.authority());
        }
        for (name, value) in self.headers.iter() {
            push_header(&mut out, &title_case(name), value);
        }
        if !self.body.is_empty() && !self.headers.has("content-length") {
            push_header(&mut out, "Content-Length", &self.body.len().to_string());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

fn validate_host(host: &str) -> Result<(), NetError> {
    if host.is_empty() || !host.is_ascii() || host.bytes().any(|b| b.is_ascii_control() || b == b' ') {
        return Err(NetError::InvalidUrl);
    }
    Ok(())
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// `content-length` -> `Content-Length`.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        upper = c == '-';
    }
    out
}
