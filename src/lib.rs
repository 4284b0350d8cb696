//! # browsernet
//!
//! The HTTP client engine behind a browser's script-facing network APIs.
//!
//! `browsernet` owns connection pooling, HTTP/1.1 serialization and
//! parsing, HTTP/2 framing and multiplexing with HPACK, a cookie store and
//! the cross-origin (CORS) response filter. URL parsing, TLS cryptography
//! and the scripting runtime are collaborators: URLs arrive as [`url::Url`]
//! values and TLS is delegated to BoringSSL.
//!
//! ## Features
//!
//! - **Connection Pooling**: 6 idle connections per host, 30 in total
//! - **HTTP/1.1 & HTTP/2**: ALPN or prior-knowledge HTTP/2 with stream multiplexing
//! - **Cookie Management**: RFC 6265 matching with PSL validation and SameSite
//! - **CORS**: `Origin` attachment and response exposure checks
//! - **Redirects and Retries**: up to 20 redirects, one retry on transient failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use browsernet::{HttpClient, Request};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), browsernet::NetError> {
//!     let client = HttpClient::new();
//!     let url = Url::parse("https://example.com").map_err(|_| browsernet::NetError::InvalidUrl)?;
//!     let response = client.fetch(Request::get(&url)?, None).await?;
//!     println!("Status: {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Core types and error definitions
//! - [`cookies`] - Cookie storage and matching
//! - [`cors`] - Origins and the CORS policy
//! - [`http`] - Headers, HTTP/1.1 wire format, transactions and cache
//! - [`http2`] - HTTP/2 framing, HPACK and connections
//! - [`socket`] - Connection pooling, connect jobs and TLS

pub mod base;
pub mod client;
pub mod cookies;
pub mod cors;
pub mod http;
pub mod http2;
pub mod socket;

pub use base::loadstate::LoadState;
pub use base::neterror::NetError;
pub use client::{ClientBuilder, ClientConfig, FetchCompletion, FetchHandle, HttpClient};
pub use cookies::CookieJar;
pub use cors::{CorsPolicy, Origin};
pub use http::{CredentialsMode, HeaderMap, Request, Response};
