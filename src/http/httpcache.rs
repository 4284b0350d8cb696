//! HTTP Cache implementation.
//!
//! Chromium mapping: net/http/http_cache.h (simplified in-memory version)
//!
//! Provides a per-client cache for GET responses with:
//! - Cache-Control parsing (max-age, no-store, no-cache, private)
//! - ETag/If-None-Match and Last-Modified/If-Modified-Since revalidation
//! - LRU eviction bounded by approximate byte size

use crate::http::headermap::HeaderMap;
use crate::http::request::Request;
use crate::http::response::Response;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Total cache budget.
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;

/// Responses larger than this are never stored.
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 10 * 1024 * 1024;

/// Cached response entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Response,
    /// When this entry was stored or last revalidated
    pub cached_at: Instant,
    pub last_access: Instant,
    /// Time-to-live from max-age; zero means revalidate before use
    pub ttl: Duration,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheEntry {
    /// Check if the entry is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }

    /// Approximate memory footprint used for eviction.
    fn size(&self) -> usize {
        let headers: usize = self.response.headers.iter().map(|(n, v)| n.len() + v.len()).sum();
        self.response.body.len() + headers + self.response.url.len()
    }

    fn validators(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(etag) = &self.etag {
            headers.push(("If-None-Match", etag.clone()));
        }
        if let Some(last_modified) = &self.last_modified {
            headers.push(("If-Modified-Since", last_modified.clone()));
        }
        headers
    }
}

/// Result of consulting the cache before going to the network.
#[derive(Debug)]
pub enum CacheLookup {
    /// Serve this response without touching the network.
    Fresh(Response),
    /// Send the request with these conditional headers added.
    Stale(Vec<(&'static str, String)>),
    Miss,
}

/// In-memory HTTP cache.
///
/// Thread-safe implementation using DashMap for concurrent access.
pub struct HttpCache {
    entries: DashMap<String, CacheEntry>,
    current_size: AtomicUsize,
    max_size_bytes: usize,
    max_entry_bytes: usize,
}

impl std::fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCache")
            .field("entries", &self.entries.len())
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCache {
    /// Create a new cache with default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRY_BYTES)
    }

    /// Create a cache with custom limits.
    pub fn with_limits(max_size_bytes: usize, max_entry_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            current_size: AtomicUsize::new(0),
            max_size_bytes,
            max_entry_bytes,
        }
    }

    fn key(request: &Request) -> Option<String> {
        (request.method == http::Method::GET).then(|| request.url_string())
    }

    /// Look up a response for `request`.
    pub fn lookup(&self, request: &Request) -> CacheLookup {
        let Some(key) = Self::key(request) else {
            return CacheLookup::Miss;
        };
        let Some(mut entry) = self.entries.get_mut(&key) else {
            return CacheLookup::Miss;
        };
        entry.last_access = Instant::now();
        if entry.is_fresh() {
            tracing::trace!(url = %key, "cache hit");
            return CacheLookup::Fresh(entry.response.clone());
        }
        let validators = entry.validators();
        drop(entry);
        if validators.is_empty() {
            self.remove_key(&key);
            return CacheLookup::Miss;
        }
        CacheLookup::Stale(validators)
    }

    /// Store a network response for `request` if it is cacheable.
    pub fn store(&self, request: &Request, response: &Response) {
        let Some(key) = Self::key(request) else {
            return;
        };
        if response.status != 200 {
            return;
        }
        let cc = parse_cache_control(&response.headers);
        if cc.no_store || cc.private {
            return;
        }
        let etag = response.headers.get("etag").map(str::to_string);
        let last_modified = response.headers.get("last-modified").map(str::to_string);
        let ttl = match cc.max_age {
            Some(age) if !cc.no_cache => Duration::from_secs(age),
            Some(_) => Duration::ZERO,
            None if etag.is_some() || last_modified.is_some() => Duration::ZERO,
            // No caching signal at all.
            None => return,
        };

        let now = Instant::now();
        let entry = CacheEntry {
            response: response.clone(),
            cached_at: now,
            last_access: now,
            ttl,
            etag,
            last_modified,
        };
        let size = entry.size();
        if size > self.max_entry_bytes || size > self.max_size_bytes {
            tracing::trace!(url = %key, size, "response too large to cache");
            return;
        }

        self.remove_key(&key);
        self.evict_for(size);
        self.current_size.fetch_add(size, Ordering::Relaxed);
        self.entries.insert(key, entry);
    }

    /// Apply a 304 Not Modified to the stored entry and return the refreshed
    /// response.
    pub fn refresh(&self, request: &Request, not_modified: &Response) -> Option<Response> {
        let key = Self::key(request)?;
        let mut entry = self.entries.get_mut(&key)?;
        for name in ["cache-control", "etag", "expires", "date", "last-modified"] {
            if let Some(value) = not_modified.headers.get(name) {
                entry.response.headers.set(name, value);
            }
        }
        let cc = parse_cache_control(&not_modified.headers);
        if let Some(age) = cc.max_age {
            entry.ttl = if cc.no_cache { Duration::ZERO } else { Duration::from_secs(age) };
        }
        if let Some(etag) = not_modified.headers.get("etag") {
            entry.etag = Some(etag.to_string());
        }
        let now = Instant::now();
        entry.cached_at = now;
        entry.last_access = now;
        Some(entry.response.clone())
    }

    /// Remove the entry for `request`.
    pub fn remove(&self, request: &Request) {
        if let Some(key) = Self::key(request) {
            self.remove_key(&key);
        }
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.entries.clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get current cache size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Evict least recently used entries until `incoming` bytes fit.
    fn evict_for(&self, incoming: usize) {
        while self.size_bytes() + incoming > self.max_size_bytes {
            let victim = self
                .entries
                .iter()
                .min_by_key(|e| e.value().last_access)
                .map(|e| e.key().clone());
            match victim {
                Some(key) => self.remove_key(&key),
                None => break,
            }
        }
    }

    fn remove_key(&self, key: &str) {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.current_size.fetch_sub(entry.size(), Ordering::Relaxed);
        }
    }
}

/// Parsed Cache-Control directive.
#[derive(Debug, Default)]
struct CacheControl {
    no_store: bool,
    no_cache: bool,
    private: bool,
    max_age: Option<u64>,
}

/// Parse Cache-Control header.
fn parse_cache_control(headers: &HeaderMap) -> CacheControl {
    let mut cc = CacheControl::default();
    for directive in headers.get_all("cache-control").iter().flat_map(|v| v.split(',')) {
        let directive = directive.trim().to_ascii_lowercase();
        match directive.as_str() {
            "no-store" => cc.no_store = true,
            "no-cache" => cc.no_cache = true,
            "private" => cc.private = true,
            d => {
                if let Some(age) = d.strip_prefix("max-age=") {
                    if let Ok(age) = age.trim_matches('"').parse::<u64>() {
                        cc.max_age = Some(age);
                    }
                }
            }
        }
    }
    cc
}
