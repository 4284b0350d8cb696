//! Socket and connection management.
//!
//! Mirrors Chromium's `net/socket/`:
//! - [`pool`]: idle connection reuse (6 per host, 30 total)
//! - [`connectjob`]: DNS → TCP → TLS connection flow
//! - [`tls`]: TLS configuration with BoringSSL

pub mod client;
pub mod connectjob;
pub mod pool;
pub mod tls;
