use crate::base::neterror::NetError;
use crate::cookies::canonical_cookie::{CanonicalCookie, CookieSource, SameSite};
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

/// Maximum cookies per domain (Chromium default).
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Maximum total cookies.
/// Chromium uses 3300; the lower cap keeps memory usage predictable.
const MAX_COOKIES_TOTAL: usize = 3000;

/// How the request relates to the site that initiated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSiteContext {
    /// Initiated by the same site, or by the browser itself.
    SameSite,
    /// Cross-site, but a top-level navigation with a safe method.
    LaxAllowed,
    CrossSite,
}

impl SameSiteContext {
    fn includes(self, same_site: SameSite) -> bool {
        match (self, same_site) {
            (_, SameSite::NoRestriction) => true,
            (SameSiteContext::SameSite, _) => true,
            (SameSiteContext::LaxAllowed, SameSite::Lax | SameSite::Unspecified) => true,
            _ => false,
        }
    }
}

/// In-memory cookie store for one browsing context.
/// Modeled after Chromium's `net::CookieMonster`.
///
/// Cookies are bucketed by their domain. Expired cookies are purged
/// lazily, when a lookup or store touches their bucket.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    store: Arc<DashMap<String, Vec<CanonicalCookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one `Set-Cookie` value received from `url` in a same-site context.
    pub fn store(&self, set_cookie: &str, url: &Url) -> Result<(), NetError> {
        self.store_with_context(set_cookie, url, SameSiteContext::SameSite)
    }

    /// Store one `Set-Cookie` value received from `url`.
    ///
    /// Cross-site responses may only set `SameSite=None` cookies.
    pub fn store_with_context(
        &self,
        set_cookie: &str,
        url: &Url,
        context: SameSiteContext,
    ) -> Result<(), NetError> {
        let host = url.host_str().ok_or(NetError::InvalidUrl)?;
        let source = CookieSource { host, path: url.path(), secure: is_secure(url) };
        let result = CanonicalCookie::from_set_cookie(set_cookie, source, OffsetDateTime::now_utc())
            .and_then(|cookie| {
                if context == SameSiteContext::CrossSite && cookie.same_site != SameSite::NoRestriction {
                    return Err(NetError::CookieInvalidSameSite);
                }
                Ok(cookie)
            });
        match result {
            Ok(cookie) => {
                self.set_canonical_cookie(cookie);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "rejected cookie");
                Err(e)
            }
        }
    }

    /// Insert or overwrite a cookie under its (domain, path, name) key.
    /// An already expired cookie only deletes the existing one.
    pub fn set_canonical_cookie(&self, mut cookie: CanonicalCookie) {
        let now = OffsetDateTime::now_utc();
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();
        entry.retain(|c| !c.is_expired(now));

        if let Some(idx) = entry.iter().position(|c| c.same_key(&cookie)) {
            if cookie.is_expired(now) {
                entry.remove(idx);
            } else {
                cookie.creation_time = entry[idx].creation_time;
                entry[idx] = cookie;
            }
            return;
        }
        if cookie.is_expired(now) {
            return;
        }

        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            let Some(oldest) = oldest_index(&entry) else { break };
            tracing::trace!(domain = %cookie.domain, "evicting cookie over per-domain cap");
            entry.remove(oldest);
        }

        entry.push(cookie);
        drop(entry); // Release the shard lock before scanning every domain

        self.enforce_global_limit();
    }

    /// Evict the oldest cookies across all domains until under the cap.
    fn enforce_global_limit(&self) {
        while self.cookie_count() > MAX_COOKIES_TOTAL {
            let mut oldest: Option<(String, usize, OffsetDateTime)> = None;
            for entry in self.store.iter() {
                if let Some(idx) = oldest_index(entry.value()) {
                    let created = entry.value()[idx].creation_time;
                    if oldest.as_ref().map_or(true, |(_, _, t)| created < *t) {
                        oldest = Some((entry.key().clone(), idx, created));
                    }
                }
            }

            let Some((domain, idx, _)) = oldest else { break };
            if let Some(mut entry) = self.store.get_mut(&domain) {
                if idx < entry.len() {
                    entry.remove(idx);
                }
            }
        }
    }

    /// Cookies to send with a request to `url`, most specific path first,
    /// then oldest first.
    pub fn cookies_for(&self, url: &Url, context: SameSiteContext) -> Vec<CanonicalCookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let host = host.to_ascii_lowercase();
        let secure = is_secure(url);
        let now = OffsetDateTime::now_utc();
        let mut result = Vec::new();

        for domain in candidate_domains(&host) {
            let Some(mut entry) = self.store.get_mut(&domain) else { continue };
            entry.retain(|c| !c.is_expired(now));
            for cookie in entry.iter_mut() {
                if !cookie.matches_host(&host)
                    || !cookie.matches_path(url.path())
                    || (cookie.secure && !secure)
                    || !context.includes(cookie.same_site)
                {
                    continue;
                }
                cookie.last_access_time = now;
                result.push(cookie.clone());
            }
        }

        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });
        result
    }

    /// The `Cookie` header value for `url`, or `None` when nothing matches.
    pub fn cookie_header(&self, url: &Url, context: SameSiteContext) -> Option<String> {
        let cookies = self.cookies_for(url, context);
        if cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = cookies.iter().map(|c| format!("{}={}", c.name, c.value)).collect();
        Some(pairs.join("; "))
    }

    /// Drop every cookie without an expiry, as when the owning context ends.
    pub fn clear_session_cookies(&self) {
        for mut entry in self.store.iter_mut() {
            entry.retain(|c| !c.is_session());
        }
        self.store.retain(|_, cookies| !cookies.is_empty());
    }

    pub fn cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Snapshot of every stored cookie, expired ones included.
    pub fn all_cookies(&self) -> Vec<CanonicalCookie> {
        self.store.iter().flat_map(|entry| entry.value().clone()).collect()
    }
}

fn is_secure(url: &Url) -> bool {
    matches!(url.scheme(), "https" | "wss")
}

fn oldest_index(cookies: &[CanonicalCookie]) -> Option<usize> {
    cookies
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.creation_time)
        .map(|(i, _)| i)
}

/// The host itself and every parent domain a cookie could be bucketed under.
fn candidate_domains(host: &str) -> Vec<String> {
    let mut domains = vec![host.to_string()];
    if host.parse::<std::net::IpAddr>().is_ok() {
        return domains;
    }
    let mut rest = host;
    while let Some((_, parent)) = rest.split_once('.') {
        if parent.is_empty() {
            break;
        }
        domains.push(parent.to_string());
        rest = parent;
    }
    domains
}
