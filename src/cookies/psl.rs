//! Public Suffix List (PSL) lookups for cookie scoping.
//!
//! Rejects cookies set on public suffixes like `.com` or `.co.uk`, and
//! decides whether two hosts belong to the same site.
//!
//! Uses Mozilla's Public Suffix List via the `psl` crate.

use psl::{List, Psl};

/// Check if a domain is a public suffix (e.g., "com", "co.uk").
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.to_ascii_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    match List.suffix(domain_bytes) {
        Some(suffix) => suffix.as_bytes() == domain_bytes,
        // Unknown TLD
        None => false,
    }
}

/// Get the registrable domain (eTLD+1) for a domain.
/// For "sub.example.com", returns "example.com".
/// For "com" (public suffix), returns None.
pub fn registrable_domain(domain: &str) -> Option<String> {
    let domain_lower = domain.to_ascii_lowercase();
    psl::domain(domain_lower.as_bytes())
        .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
        .map(|s| s.to_string())
}

/// RFC 6265 domain matching: `host` is `domain` or a subdomain of it.
pub fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.strip_prefix('.').unwrap_or(domain);
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    host.len() > domain.len()
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
        && host[host.len() - domain.len()..].eq_ignore_ascii_case(domain)
}

/// Whether two hosts share a registrable domain. Hosts without one (IP
/// literals, bare public suffixes) are same-site only with themselves.
pub fn is_same_site(a: &str, b: &str) -> bool {
    if a.parse::<std::net::IpAddr>().is_ok() || b.parse::<std::net::IpAddr>().is_ok() {
        return a.eq_ignore_ascii_case(b);
    }
    match (registrable_domain(a), registrable_domain(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_public_suffix_com() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix("COM"));
    }

    #[test]
    fn test_is_public_suffix_co_uk() {
        assert!(is_public_suffix("co.uk"));
        assert!(is_public_suffix("github.io"));
    }

    #[test]
    fn test_not_public_suffix() {
        assert!(!is_public_suffix("example.com"));
        assert!(!is_public_suffix("sub.example.com"));
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("sub.example.com"), Some("example.com".to_string()));
        assert_eq!(registrable_domain("sub.example.co.uk"), Some("example.co.uk".to_string()));
        assert_eq!(registrable_domain("com"), None);
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches(".example.com", "www.example.com"));
        assert!(domain_matches("example.com", "A.B.EXAMPLE.COM"));
        assert!(!domain_matches("example.com", "badexample.com"));
        assert!(!domain_matches("www.example.com", "example.com"));
        assert!(!domain_matches("example.com", "example.org"));
    }

    #[test]
    fn test_same_site() {
        assert!(is_same_site("a.example.com", "b.example.com"));
        assert!(is_same_site("example.com", "www.example.com"));
        assert!(!is_same_site("example.com", "example.org"));
        assert!(!is_same_site("a.github.io", "b.github.io"));
        assert!(is_same_site("127.0.0.1", "127.0.0.1"));
        assert!(!is_same_site("127.0.0.1", "10.0.0.1"));
    }
}
