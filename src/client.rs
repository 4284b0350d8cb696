//! HTTP client with builder pattern.
//!
//! [`HttpClient`] drives one logical fetch end to end: CORS and cookie
//! policy, the HTTP cache, a pooled or fresh connection, protocol dispatch,
//! then redirects.
//!
//! # Example
//!
//! ```rust,no_run
//! use browsernet::{HttpClient, Request};
//! use url::Url;
//!
//! # async fn run() -> Result<(), browsernet::NetError> {
//! let client = HttpClient::builder().max_redirects(10).build();
//! let url = Url::parse("https://api.example/data").map_err(|_| browsernet::NetError::InvalidUrl)?;
//! let response = client
//!     .fetch(Request::get(&url)?, Some("https://app.example"))
//!     .await?;
//! println!("{} {}", response.status, response.text());
//! # Ok(())
//! # }
//! ```

use crate::base::loadstate::{LoadState, LoadStateCell};
use crate::base::neterror::NetError;
use crate::cookies::jar::{CookieJar, SameSiteContext};
use crate::cookies::psl;
use crate::cors::origin::Origin;
use crate::cors::policy::{CorsConfig, CorsPolicy};
use crate::http::httpcache::{CacheLookup, HttpCache};
use crate::http::request::{CredentialsMode, Request};
use crate::http::response::Response;
use crate::http::retry::RetryConfig;
use crate::http::streamfactory::{HttpStreamFactory, PooledConnection, StreamFactoryConfig};
use crate::http::transaction::HttpNetworkTransaction;
use crate::http2::H2Settings;
use crate::socket::pool::{ConnectionPool, PoolConfig};
use crate::socket::tls::TlsConfig;
use bytes::Bytes;
use http::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;

/// Settings for an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Redirects followed before failing with `TooManyRedirects`.
    pub max_redirects: usize,
    pub connect_timeout: Duration,
    /// Bound on each stalled read while waiting for response bytes.
    pub read_timeout: Duration,
    pub max_connections_per_host: usize,
    pub max_total_idle_connections: usize,
    pub idle_timeout: Duration,
    /// Speak HTTP/2 on cleartext connections without ALPN.
    pub http2_prior_knowledge: bool,
    pub tls: TlsConfig,
    pub cache_enabled: bool,
    pub retry: RetryConfig,
    pub cors: CorsConfig,
    pub http2: H2Settings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_redirects: 20, // Chromium default
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            max_connections_per_host: 6,
            max_total_idle_connections: 30,
            idle_timeout: Duration::from_secs(60),
            http2_prior_knowledge: false,
            tls: TlsConfig::default(),
            cache_enabled: true,
            retry: RetryConfig::default(),
            cors: CorsConfig::default(),
            http2: H2Settings::default(),
        }
    }
}

/// Builder for creating an [`HttpClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    cookie_jar: Option<CookieJar>,
}

impl ClientBuilder {
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn max_connections_per_host(mut self, max: usize) -> Self {
        self.config.max_connections_per_host = max;
        self
    }

    pub fn max_total_idle_connections(mut self, max: usize) -> Self {
        self.config.max_total_idle_connections = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn http2_prior_knowledge(mut self, enabled: bool) -> Self {
        self.config.http2_prior_knowledge = enabled;
        self
    }

    /// Set TLS options.
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn cors_config(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    pub fn http2_settings(mut self, settings: H2Settings) -> Self {
        self.config.http2 = settings;
        self
    }

    /// Share a cookie jar with the client. The client still owns the
    /// session: its session cookies are cleared when the last clone of the
    /// client is dropped.
    pub fn cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Build the client.
    pub fn build(self) -> HttpClient {
        let config = self.config;
        let pool = PoolConfig {
            max_per_host: config.max_connections_per_host,
            max_total: config.max_total_idle_connections,
            idle_timeout: config.idle_timeout,
        };
        let factory = HttpStreamFactory::new(
            pool,
            StreamFactoryConfig {
                connect_timeout: config.connect_timeout,
                tls: config.tls.clone(),
                h2_settings: config.http2,
                http2_prior_knowledge: config.http2_prior_knowledge,
            },
        );
        HttpClient {
            inner: Arc::new(ClientInner {
                factory,
                cookies: self.cookie_jar.unwrap_or_default(),
                cors: CorsPolicy::new(config.cors),
                cache: config.cache_enabled.then(HttpCache::new),
                next_fetch_id: AtomicU64::new(1),
                config,
            }),
        }
    }
}

/// One finished fetch, as posted to a completion queue.
#[derive(Debug)]
pub struct FetchCompletion {
    pub id: u64,
    pub result: Result<Response, NetError>,
}

/// Control over a fetch started with [`HttpClient::start_fetch`].
///
/// Dropping the handle does not cancel the fetch.
#[derive(Debug)]
pub struct FetchHandle {
    id: u64,
    load_state: LoadStateCell,
    cancel: watch::Sender<bool>,
}

impl FetchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state.get()
    }

    /// Abort the fetch. Its completion carries `NetError::Aborted` unless
    /// it already finished.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

struct ClientInner {
    config: ClientConfig,
    factory: HttpStreamFactory,
    cookies: CookieJar,
    cors: CorsPolicy,
    cache: Option<HttpCache>,
    next_fetch_id: AtomicU64,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cookies.clear_session_cookies();
    }
}

/// Browser-side HTTP client for one browsing context.
///
/// Cloning is cheap and clones share the pool, cookie jar and cache.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.inner.config)
            .field("idle_connections", &self.inner.factory.pool().count())
            .field("cookies", &self.inner.cookies.cookie_count())
            .finish()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.inner.cookies
    }

    pub fn cache(&self) -> Option<&HttpCache> {
        self.inner.cache.as_ref()
    }

    pub fn pool(&self) -> &ConnectionPool<PooledConnection> {
        self.inner.factory.pool()
    }

    /// Close every idle pooled connection.
    pub fn close_idle_connections(&self) {
        self.inner.factory.close_idle_connections();
    }

    /// Fetch `request` on behalf of a document whose serialized origin is
    /// `requesting_origin`. `None` marks a browser-initiated request, which
    /// is not subject to CORS.
    ///
    /// A response withheld by CORS surfaces as `NetError::Failed`.
    pub async fn fetch(&self, request: Request, requesting_origin: Option<&str>) -> Result<Response, NetError> {
        let load_state = LoadStateCell::default();
        self.fetch_with_load_state(request, requesting_origin, &load_state).await
    }

    /// Start a fetch in the background. Exactly one [`FetchCompletion`] is
    /// posted to `completions` when it finishes, fails or is cancelled.
    pub fn start_fetch(
        &self,
        request: Request,
        requesting_origin: Option<String>,
        completions: mpsc::UnboundedSender<FetchCompletion>,
    ) -> FetchHandle {
        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let (cancel, mut cancelled) = watch::channel(false);
        let load_state = LoadStateCell::default();

        let client = self.clone();
        let state = load_state.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                result = client.fetch_with_load_state(request, requesting_origin.as_deref(), &state) => result,
                _ = wait_cancelled(&mut cancelled) => {
                    tracing::debug!(id, "fetch cancelled");
                    Err(NetError::Aborted)
                }
            };
            state.set(LoadState::Idle);
            if completions.send(FetchCompletion { id, result }).is_err() {
                tracing::trace!(id, "completion queue closed");
            }
        });

        FetchHandle { id, load_state, cancel }
    }

    async fn fetch_with_load_state(
        &self,
        mut request: Request,
        requesting_origin: Option<&str>,
        load_state: &LoadStateCell,
    ) -> Result<Response, NetError> {
        request.validate_headers()?;
        let mut url = request.url().clone();
        let mut redirects = 0;

        loop {
            let mut response = self.fetch_hop(&request, &url, requesting_origin, load_state).await?;

            let location = response.location().filter(|_| response.is_redirect()).map(str::to_string);
            let Some(location) = location else {
                response.url = url.to_string();
                response.redirected = redirects > 0;
                return Ok(response);
            };

            if redirects >= self.inner.config.max_redirects {
                tracing::warn!(url = %url, redirects, "redirect limit reached");
                return Err(NetError::TooManyRedirects);
            }
            redirects += 1;

            let next = url.join(&location).map_err(|_| NetError::InvalidRedirect)?;
            if !matches!(next.scheme(), "http" | "https") {
                return Err(NetError::InvalidRedirect);
            }
            tracing::debug!(from = %url, to = %next, status = response.status, "following redirect");
            request = redirect_request(request, &url, &next, response.status)?;
            url = next;
        }
    }

    /// One request/response hop with policy applied, no redirects.
    async fn fetch_hop(
        &self,
        request: &Request,
        url: &Url,
        requesting_origin: Option<&str>,
        load_state: &LoadStateCell,
    ) -> Result<Response, NetError> {
        let inner = &*self.inner;
        let mut outgoing = request.clone();

        // An unparseable document origin never gets same-origin credentials.
        let cross_origin = requesting_origin
            .is_some_and(|origin| Origin::parse(origin).is_err() || inner.cors.is_cross_origin(origin, url));
        let include_credentials = match request.credentials {
            CredentialsMode::Omit => false,
            CredentialsMode::SameOrigin => !cross_origin,
            CredentialsMode::Include => true,
        };
        if let Some(origin) = requesting_origin {
            inner
                .cors
                .normalize_outgoing_origin_header(&mut outgoing.headers, origin, url, &request.method);
        }

        let site = same_site_context(request, url, requesting_origin);
        if include_credentials {
            if let Some(cookies) = inner.cookies.cookie_header(url, site) {
                outgoing.headers.set("Cookie", cookies);
            }
        } else {
            outgoing.headers.remove("cookie");
            outgoing.headers.remove("authorization");
        }

        let cache = inner.cache.as_ref().filter(|_| outgoing.method == Method::GET);
        let mut revalidating = false;
        let mut cached = None;
        if let Some(cache) = cache {
            match cache.lookup(&outgoing) {
                CacheLookup::Fresh(response) => cached = Some(response),
                CacheLookup::Stale(validators) => {
                    for (name, value) in validators {
                        outgoing.headers.set(name, value);
                    }
                    revalidating = true;
                }
                CacheLookup::Miss => {}
            }
        }

        let response = match cached {
            Some(response) => response,
            None => {
                let mut transaction =
                    HttpNetworkTransaction::new(&inner.factory, &outgoing, inner.config.read_timeout);
                transaction.set_retry_config(inner.config.retry);
                transaction.set_load_state_cell(load_state.clone());
                let response = transaction.start().await?;

                if include_credentials {
                    for line in response.headers.get_all("set-cookie") {
                        // Rejections are logged by the jar and otherwise ignored.
                        let _ = inner.cookies.store_with_context(line, url, site);
                    }
                }

                match cache {
                    Some(cache) if revalidating && response.status == 304 => {
                        cache.refresh(&outgoing, &response).unwrap_or(response)
                    }
                    Some(cache) => {
                        cache.store(&outgoing, &response);
                        response
                    }
                    None => response,
                }
            }
        };

        if let Some(origin) = requesting_origin {
            let credentials_requested = request.credentials == CredentialsMode::Include;
            if !inner.cors.cors_allows_response(origin, url, &response.headers, credentials_requested) {
                tracing::warn!(url = %url, origin = %origin, "response blocked by CORS policy");
                return Err(NetError::Failed);
            }
        }
        Ok(response)
    }
}

/// Resolves once the handle asks for cancellation. Never resolves if the
/// handle is dropped first.
async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
    loop {
        let done = *cancelled.borrow_and_update();
        if done {
            return;
        }
        if cancelled.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Which SameSite cookies a hop may carry.
fn same_site_context(request: &Request, url: &Url, requesting_origin: Option<&str>) -> SameSiteContext {
    let Some(origin) = requesting_origin else {
        return SameSiteContext::SameSite;
    };
    let same_site = match (Origin::parse(origin), url.host_str()) {
        (Ok(Origin::Tuple { host, .. }), Some(target)) => psl::is_same_site(&host, target),
        _ => false,
    };
    if same_site {
        SameSiteContext::SameSite
    } else if request.top_level_navigation && matches!(request.method, Method::GET | Method::HEAD) {
        SameSiteContext::LaxAllowed
    } else {
        SameSiteContext::CrossSite
    }
}

/// Rebuild `request` for the next hop of a redirect chain.
fn redirect_request(request: Request, from: &Url, to: &Url, status: u16) -> Result<Request, NetError> {
    let mut next = Request::new(request.method.clone(), to)?;
    next.headers = request.headers;
    next.body = request.body;
    next.credentials = request.credentials;
    next.top_level_navigation = request.top_level_navigation;
    next.headers.remove("host");

    let switch_to_get = (status == 303 && next.method != Method::HEAD)
        || (matches!(status, 301 | 302) && next.method == Method::POST);
    if switch_to_get {
        next.method = Method::GET;
        next.body = Bytes::new();
        next.headers.remove("content-type");
        next.headers.remove("content-length");
    }

    if !Origin::from_url(from).is_same_origin(&Origin::from_url(to)) {
        next.headers.remove("authorization");
        next.headers.remove("cookie");
    }
    Ok(next)
}
