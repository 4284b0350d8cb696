//! Per-stream state (RFC 7540 Section 5.1).

use super::flowcontrol::FlowControl;
use crate::base::neterror::NetError;
use crate::http::response::{Response, ResponseHead};
use bytes::BytesMut;
use tokio::sync::oneshot;

/// Client-side view of a stream's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    /// We sent END_STREAM.
    HalfClosedLocal,
    /// Peer sent END_STREAM.
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// HEADERS sent, with or without END_STREAM.
    pub fn on_send_headers(self, end_stream: bool) -> Self {
        match (self, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedLocal,
            (other, true) => other.on_send_end_stream(),
            (other, false) => other,
        }
    }

    pub fn on_send_end_stream(self) -> Self {
        match self {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        }
    }

    pub fn on_recv_end_stream(self) -> Self {
        match self {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => other,
        }
    }

    /// Whether the peer may still send frames on this stream.
    pub fn can_recv(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Whether we may still send DATA on this stream.
    pub fn can_send(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }
}

pub(crate) type Responder = oneshot::Sender<Result<Response, NetError>>;

/// One request/response exchange on a connection.
#[derive(Debug)]
pub(crate) struct H2Stream {
    pub state: StreamState,
    pub send_window: FlowControl,
    pub recv_window: FlowControl,
    pub head: Option<ResponseHead>,
    pub body: BytesMut,
    responder: Option<Responder>,
}

impl H2Stream {
    pub fn new(send_window: i64, recv_window: i64, responder: Responder) -> Self {
        Self {
            state: StreamState::Idle,
            send_window: FlowControl::new(send_window),
            recv_window: FlowControl::new(recv_window),
            head: None,
            body: BytesMut::new(),
            responder: Some(responder),
        }
    }

    /// The fetch waiting on this stream went away.
    pub fn is_abandoned(&self) -> bool {
        self.responder.as_ref().map_or(true, |r| r.is_closed())
    }

    /// Deliver the final outcome. Later calls are no-ops.
    pub fn finish(&mut self, result: Result<Response, NetError>) {
        self.state = StreamState::Closed;
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(result);
        }
    }
}
