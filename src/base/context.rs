//! Ergonomic error context helpers.
//!
//! Converts IO errors into `NetError` codes while logging the host and port
//! the operation was talking to.

use crate::base::neterror::NetError;
use std::io;

/// Map an IO error kind onto the closest network error code.
pub fn net_error_from_io(err: &io::Error) -> NetError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
        io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        io::ErrorKind::NotConnected => NetError::SocketNotConnected,
        io::ErrorKind::BrokenPipe => NetError::ConnectionReset,
        io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
        io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        io::ErrorKind::AddrNotAvailable => NetError::AddressUnreachable,
        _ => NetError::ConnectionFailed,
    }
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use browsernet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 443)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add DNS resolution context to an IO error.
    fn dns_context(self, host: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            let net = net_error_from_io(&e);
            tracing::debug!(host = %host, port, error = %e, code = net.as_i32(), "socket error");
            net
        })
    }

    fn dns_context(self, host: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, error = %e, "name resolution failed");
            NetError::NameNotResolved
        })
    }
}
