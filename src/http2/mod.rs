//! HTTP/2 client: framing, HPACK and a multiplexed connection.

pub mod connection;
pub mod error;
pub mod flowcontrol;
pub mod frame;
pub mod hpack;
pub mod huffman;
pub mod settings;
pub mod stream;

pub use connection::Http2Connection;
pub use error::{ErrorCode, H2Error};
pub use settings::H2Settings;
