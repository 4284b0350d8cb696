use crate::base::neterror::NetError;
use std::fmt;
use url::{Host, Url};

/// A web origin: a (scheme, host, port) tuple, or an opaque origin that
/// serializes as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Tuple { scheme: String, host: String, port: u16 },
    Opaque,
}

impl Origin {
    /// The origin of `url`. Non-HTTP(S) URLs have an opaque origin.
    pub fn from_url(url: &Url) -> Self {
        if !is_http_scheme(url.scheme()) {
            return Origin::Opaque;
        }
        match (url.host(), url.port_or_known_default()) {
            (Some(host), Some(port)) => Origin::Tuple {
                scheme: url.scheme().to_string(),
                host: host.to_string(),
                port,
            },
            _ => Origin::Opaque,
        }
    }

    /// Parse a serialized origin as carried by an `Origin` header or a
    /// document. Accepts `null` or an exact ASCII serialization of an
    /// HTTP(S) origin; anything else (paths, whitespace, default ports
    /// spelled out) is rejected.
    pub fn parse(serialized: &str) -> Result<Self, NetError> {
        if serialized == "null" {
            return Ok(Origin::Opaque);
        }
        if serialized.bytes().any(|b| b.is_ascii_control() || b == b' ' || !b.is_ascii()) {
            return Err(NetError::InvalidUrl);
        }
        let url = Url::parse(serialized).map_err(|_| NetError::InvalidUrl)?;
        if !is_http_scheme(url.scheme()) || !has_valid_host(&url) {
            return Err(NetError::InvalidUrl);
        }
        let origin = Origin::from_url(&url);
        if origin.ascii_serialization() != serialized {
            return Err(NetError::InvalidUrl);
        }
        Ok(origin)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Origin::Opaque)
    }

    /// Two tuple origins are same-origin when all three parts match.
    /// Opaque origins are never same-origin with anything.
    pub fn is_same_origin(&self, other: &Origin) -> bool {
        match (self, other) {
            (Origin::Opaque, _) | (_, Origin::Opaque) => false,
            (a, b) => a == b,
        }
    }

    /// `scheme://host[:port]` with the default port omitted, or `null`.
    pub fn ascii_serialization(&self) -> String {
        match self {
            Origin::Opaque => "null".to_string(),
            Origin::Tuple { scheme, host, port } => {
                if default_port(scheme) == Some(*port) {
                    format!("{scheme}://{host}")
                } else {
                    format!("{scheme}://{host}:{port}")
                }
            }
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ascii_serialization())
    }
}

fn is_http_scheme(scheme: &str) -> bool {
    scheme == "http" || scheme == "https"
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

/// Hostname labels must be non-empty LDH labels not starting or ending
/// with a hyphen. IP literals are accepted as normalized by the parser.
pub(crate) fn has_valid_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => !domain.is_empty() && domain.split('.').all(is_ldh_label),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        None => false,
    }
}

fn is_ldh_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
