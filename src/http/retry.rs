//! Retry policy for transient connection failures.
//!
//! Based on Chromium's `HttpNetworkTransaction::RetryReason` enum and retry logic.
//! See: net/http/http_network_transaction.h

use crate::base::neterror::NetError;
use std::time::Duration;

/// Reasons for retrying a request (mirrors Chromium's RetryReason enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Server closed connection unexpectedly
    ConnectionReset,
    /// Connection was closed during request
    ConnectionClosed,
    /// Connection was aborted
    ConnectionAborted,
    /// Connection refused by the server
    ConnectionRefused,
    /// Socket not connected
    SocketNotConnected,
    /// Empty response received
    EmptyResponse,
    /// Connect or read timeout
    HttpRequestTimeout,
    /// HTTP/2 server refused stream
    Http2ServerRefusedStream,
}

impl RetryReason {
    /// Map a NetError to a RetryReason, if the error is retryable.
    pub fn from_error(error: &NetError) -> Option<Self> {
        match error {
            NetError::ConnectionReset => Some(Self::ConnectionReset),
            NetError::ConnectionClosed => Some(Self::ConnectionClosed),
            NetError::ConnectionAborted => Some(Self::ConnectionAborted),
            NetError::ConnectionRefused => Some(Self::ConnectionRefused),
            NetError::SocketNotConnected => Some(Self::SocketNotConnected),
            NetError::EmptyResponse => Some(Self::EmptyResponse),
            NetError::ConnectionTimedOut | NetError::TimedOut => Some(Self::HttpRequestTimeout),
            NetError::Http2ServerRefusedStream => Some(Self::Http2ServerRefusedStream),
            _ => None,
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 1).
    pub max_retries: usize,
    /// Pause before each retry (default: none).
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 1, delay: Duration::ZERO }
    }
}

impl RetryConfig {
    /// Create a config with no retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Default::default() }
    }

    /// Whether a failure with `error` after `retries` earlier retries
    /// should be attempted again.
    pub fn should_retry(&self, error: &NetError, retries: usize) -> Option<RetryReason> {
        if retries >= self.max_retries {
            return None;
        }
        RetryReason::from_error(error)
    }
}
