use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// The current state of a transaction.
/// This roughly matches net/base/load_states.h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// The request is idle.
    #[default]
    Idle,

    /// Connecting to the host (DNS + TCP handshake).
    Connecting,

    /// Establishing an SSL connection.
    SslHandshake,

    /// Sending the HTTP request.
    SendingRequest,

    /// Waiting for the server response (TTFB).
    WaitingForResponse,

    /// Reading the response body.
    ReadingResponse,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Connecting => "connecting",
            LoadState::SslHandshake => "ssl_handshake",
            LoadState::SendingRequest => "sending_request",
            LoadState::WaitingForResponse => "waiting_for_response",
            LoadState::ReadingResponse => "reading_response",
        }
    }
}

impl LoadState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LoadState::Connecting,
            2 => LoadState::SslHandshake,
            3 => LoadState::SendingRequest,
            4 => LoadState::WaitingForResponse,
            5 => LoadState::ReadingResponse,
            _ => LoadState::Idle,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LoadState::Idle => 0,
            LoadState::Connecting => 1,
            LoadState::SslHandshake => 2,
            LoadState::SendingRequest => 3,
            LoadState::WaitingForResponse => 4,
            LoadState::ReadingResponse => 5,
        }
    }
}

/// Load state shared between a running transaction and observers of it.
#[derive(Debug, Clone, Default)]
pub struct LoadStateCell(Arc<AtomicU8>);

impl LoadStateCell {
    pub fn get(&self) -> LoadState {
        LoadState::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, state: LoadState) {
        self.0.store(state.to_u8(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_shared_between_clones() {
        let cell = LoadStateCell::default();
        let observer = cell.clone();
        assert_eq!(observer.get(), LoadState::Idle);
        for state in [
            LoadState::Connecting,
            LoadState::SslHandshake,
            LoadState::SendingRequest,
            LoadState::WaitingForResponse,
            LoadState::ReadingResponse,
            LoadState::Idle,
        ] {
            cell.set(state);
            assert_eq!(observer.get(), state);
        }
    }
}
