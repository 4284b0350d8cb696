//! Cookie storage and matching.
//!
//! | Chromium (C++) | browsernet (Rust) | Responsibility |
//! |----------------|-------------------|----------------|
//! | `net::CookieMonster` | [`CookieJar`](jar::CookieJar) | Cookie jar with capped storage |
//! | `net::CanonicalCookie` | [`CanonicalCookie`](canonical_cookie::CanonicalCookie) | Single cookie representation |
//! | `net::registry_controlled_domains` | [`psl`] | Public suffix and same-site checks |

pub mod canonical_cookie;
pub mod jar;
pub mod psl;

pub use canonical_cookie::{CanonicalCookie, SameSite};
pub use jar::{CookieJar, SameSiteContext};
