use crate::base::neterror::NetError;
use thiserror::Error;

/// HTTP/2 wire error codes (RFC 7540 Section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Unknown codes are treated as INTERNAL_ERROR (RFC 7540 Section 7).
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }

    /// Error surfaced to a stream that the peer reset with this code.
    pub fn to_net_error(self) -> NetError {
        match self {
            Self::RefusedStream => NetError::Http2ServerRefusedStream,
            Self::FlowControlError => NetError::Http2FlowControlError,
            Self::FrameSizeError => NetError::Http2FrameSizeError,
            Self::CompressionError => NetError::Http2CompressionError,
            Self::StreamClosed => NetError::Http2StreamClosed,
            Self::Cancel => NetError::Aborted,
            _ => NetError::Http2ProtocolError,
        }
    }
}

/// Connection-fatal errors raised by the framing, HPACK and flow-control layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum H2Error {
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    #[error("frame size error")]
    FrameSize,
    #[error("HPACK compression error")]
    Compression,
    #[error("flow control error")]
    FlowControl,
    #[error("frame on closed stream")]
    StreamClosed,
}

impl H2Error {
    /// Code sent in the GOAWAY that tears the connection down.
    pub fn code(&self) -> ErrorCode {
        match self {
            H2Error::Protocol(_) => ErrorCode::ProtocolError,
            H2Error::FrameSize => ErrorCode::FrameSizeError,
            H2Error::Compression => ErrorCode::CompressionError,
            H2Error::FlowControl => ErrorCode::FlowControlError,
            H2Error::StreamClosed => ErrorCode::StreamClosed,
        }
    }
}

impl From<H2Error> for NetError {
    fn from(e: H2Error) -> Self {
        match e {
            H2Error::Protocol(_) => NetError::Http2ProtocolError,
            H2Error::FrameSize => NetError::Http2FrameSizeError,
            H2Error::Compression => NetError::Http2CompressionError,
            H2Error::FlowControl => NetError::Http2FlowControlError,
            H2Error::StreamClosed => NetError::Http2StreamClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_code_is_internal() {
        assert_eq!(ErrorCode::from_u32(0xff), ErrorCode::InternalError);
        assert_eq!(ErrorCode::from_u32(0x7), ErrorCode::RefusedStream);
    }

    #[test]
    fn test_h2_errors_are_protocol_errors() {
        for e in [
            H2Error::Protocol("x"),
            H2Error::FrameSize,
            H2Error::Compression,
            H2Error::FlowControl,
        ] {
            assert!(NetError::from(e).is_protocol_error());
        }
        assert_eq!(H2Error::Compression.code(), ErrorCode::CompressionError);
    }
}
