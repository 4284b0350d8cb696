use crate::base::neterror::NetError;
use crate::cookies::psl;
use time::OffsetDateTime;

/// Represents a cookie.
/// Modeled after Chromium's `net::CanonicalCookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCookie {
    pub name: String,
    pub value: String,
    /// Lowercase, without a leading dot.
    pub domain: String,
    pub path: String,
    pub creation_time: OffsetDateTime,
    /// `None` for session cookies.
    pub expiration_time: Option<OffsetDateTime>,
    pub last_access_time: OffsetDateTime,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the cookie had no Domain attribute; it then matches only
    /// `domain` exactly.
    pub host_only: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Unspecified,
    NoRestriction,
    Lax,
    Strict,
}

/// The request a Set-Cookie line arrived on, or a lookup is made for.
#[derive(Debug, Clone, Copy)]
pub struct CookieSource<'a> {
    pub host: &'a str,
    pub path: &'a str,
    pub secure: bool,
}

impl CanonicalCookie {
    /// Parse a Set-Cookie value received in response to `source`.
    ///
    /// Unknown attributes are ignored and malformed `Max-Age`/`Expires`
    /// leave the cookie session-scoped. Security rules (domain matching,
    /// public suffixes, secure origins, name prefixes) reject the cookie.
    pub fn from_set_cookie(line: &str, source: CookieSource<'_>, now: OffsetDateTime) -> Result<Self, NetError> {
        let parsed = cookie::Cookie::parse(line).map_err(|_| NetError::CookieParseFailed)?;
        let host = source.host.to_ascii_lowercase();

        let (domain, host_only) = match parsed.domain().map(|d| d.trim_start_matches('.').to_ascii_lowercase()) {
            None => (host.clone(), true),
            Some(d) if d.is_empty() => (host.clone(), true),
            Some(d) if host.parse::<std::net::IpAddr>().is_ok() => {
                if d != host {
                    return Err(NetError::CookieDomainMismatch);
                }
                (d, true)
            }
            Some(d) => {
                if !psl::domain_matches(&d, &host) {
                    return Err(NetError::CookieDomainMismatch);
                }
                if psl::is_public_suffix(&d) {
                    // A public suffix may only set host cookies on itself.
                    if d != host {
                        return Err(NetError::CookiePublicSuffix);
                    }
                    (d, true)
                } else {
                    (d, false)
                }
            }
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(source.path),
        };

        // Max-Age wins over Expires; a non-positive Max-Age expires at once.
        let expiration_time = match parsed.max_age() {
            Some(age) if age.is_positive() => now.checked_add(age),
            Some(_) => Some(OffsetDateTime::UNIX_EPOCH),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        let same_site = match parsed.same_site() {
            Some(cookie::SameSite::Lax) => SameSite::Lax,
            Some(cookie::SameSite::Strict) => SameSite::Strict,
            Some(cookie::SameSite::None) => SameSite::NoRestriction,
            None => SameSite::Unspecified,
        };

        let cookie = CanonicalCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            creation_time: now,
            expiration_time,
            last_access_time: now,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
            same_site,
        };

        if cookie.secure && !source.secure {
            return Err(NetError::CookieInsecureOrigin);
        }
        if cookie.same_site == SameSite::NoRestriction && !cookie.secure {
            return Err(NetError::CookieInvalidSameSite);
        }
        cookie.validate_prefix(source.secure)?;
        Ok(cookie)
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        self.expiration_time.is_some_and(|expiry| expiry <= current_time)
    }

    pub fn is_session(&self) -> bool {
        self.expiration_time.is_none()
    }

    /// Whether this cookie and `other` share the (domain, path, name) key.
    pub fn same_key(&self, other: &CanonicalCookie) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.domain == other.domain
            && self.host_only == other.host_only
    }

    /// Whether the cookie applies to requests for `host`.
    pub fn matches_host(&self, host: &str) -> bool {
        if self.host_only {
            self.domain.eq_ignore_ascii_case(host)
        } else {
            psl::domain_matches(&self.domain, host)
        }
    }

    /// Implements RFC 6265 path matching.
    pub fn matches_path(&self, request_path: &str) -> bool {
        let cookie_path = self.path.as_str();
        if request_path == cookie_path {
            return true;
        }
        if let Some(rest) = request_path.strip_prefix(cookie_path) {
            return cookie_path.ends_with('/') || rest.starts_with('/');
        }
        false
    }

    /// Validate __Secure- and __Host- cookie prefixes per RFC 6265bis.
    /// - __Secure- cookies MUST have the Secure attribute
    /// - __Host- cookies MUST have Secure, Path="/", and no Domain attribute
    pub fn validate_prefix(&self, secure_origin: bool) -> Result<(), NetError> {
        if self.name.starts_with("__Secure-") && (!self.secure || !secure_origin) {
            return Err(NetError::CookieInvalidPrefix);
        }

        if self.name.starts_with("__Host-") {
            // __Host- requires: Secure flag, Path="/", host-only (no Domain), secure origin
            if !self.secure || self.path != "/" || !self.host_only || !secure_origin {
                return Err(NetError::CookieInvalidPrefix);
            }
        }

        Ok(())
    }
}

/// RFC 6265 section 5.1.4 default-path.
pub fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => request_path[..i].to_string(),
    }
}
