pub mod chunked;
pub mod decoding;
pub mod headermap;
pub mod httpcache;
pub mod request;
pub mod response;
pub mod retry;
pub mod stream;
pub mod streamfactory;
pub mod transaction;

// Re-exports for convenience
pub use headermap::HeaderMap;
pub use request::{CredentialsMode, Request, Scheme};
pub use response::{HttpVersion, Response};
