use thiserror::Error;

/// Network error codes, numbered after Chromium's `net_error_list.h`.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic Errors
    #[error("Generic failure")]
    Failed,
    #[error("Request aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Operation timed out")]
    TimedOut,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("ALPN negotiation failed")]
    AlpnNegotiationFailed,

    // Certificate Errors
    #[error("Server certificate is invalid")]
    CertInvalid,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid redirect")]
    InvalidRedirect,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Method not supported")]
    MethodNotSupported,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("HTTP/2 protocol error")]
    Http2ProtocolError,
    #[error("Response headers multiple Content-Length")]
    ResponseHeadersMultipleContentLength,
    #[error("HTTP/2 server refused stream")]
    Http2ServerRefusedStream,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("HTTP/2 flow control error")]
    Http2FlowControlError,
    #[error("HTTP/2 frame size error")]
    Http2FrameSizeError,
    #[error("HTTP/2 compression error")]
    Http2CompressionError,
    #[error("HTTP/2 stream closed")]
    Http2StreamClosed,

    // Cookie rejections (crate-private range)
    #[error("Cookie prefix validation failed")]
    CookieInvalidPrefix,
    #[error("Cookie domain is a public suffix")]
    CookiePublicSuffix,
    #[error("Cookie domain does not match request host")]
    CookieDomainMismatch,
    #[error("Secure cookie set from an insecure origin")]
    CookieInsecureOrigin,
    #[error("SameSite=None cookie without Secure")]
    CookieInvalidSameSite,
    #[error("Cookie line could not be parsed")]
    CookieParseFailed,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::TimedOut => -7,
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::AddressUnreachable => -109,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,
            NetError::AlpnNegotiationFailed => -122,
            NetError::CertInvalid => -207,
            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidRedirect => -303,
            NetError::TooManyRedirects => -310,
            NetError::InvalidResponse => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::MethodNotSupported => -322,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentDecodingFailed => -330,
            NetError::Http2ProtocolError => -337,
            NetError::ResponseHeadersMultipleContentLength => -346,
            NetError::Http2ServerRefusedStream => -351,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::Http2FlowControlError => -361,
            NetError::Http2FrameSizeError => -362,
            NetError::Http2CompressionError => -363,
            NetError::Http2StreamClosed => -376,
            NetError::CookieInvalidPrefix => -903,
            NetError::CookiePublicSuffix => -904,
            NetError::CookieDomainMismatch => -905,
            NetError::CookieInsecureOrigin => -906,
            NetError::CookieInvalidSameSite => -907,
            NetError::CookieParseFailed => -908,
            NetError::Unknown(code) => *code,
        }
    }

    /// Connection-level failures that are worth one more attempt on a fresh
    /// connection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionRefused
                | NetError::ConnectionAborted
                | NetError::ConnectionTimedOut
                | NetError::TimedOut
                | NetError::SocketNotConnected
                | NetError::EmptyResponse
                | NetError::Http2ServerRefusedStream
        )
    }

    /// Malformed data from the peer. These are never retried.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            NetError::InvalidResponse
                | NetError::InvalidChunkedEncoding
                | NetError::IncompleteChunkedEncoding
                | NetError::ResponseHeadersTooBig
                | NetError::ResponseHeadersMultipleContentLength
                | NetError::ContentLengthMismatch
                | NetError::ContentDecodingFailed
                | NetError::Http2ProtocolError
                | NetError::Http2FlowControlError
                | NetError::Http2FrameSizeError
                | NetError::Http2CompressionError
        )
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -7 => NetError::TimedOut,
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -109 => NetError::AddressUnreachable,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,
            -122 => NetError::AlpnNegotiationFailed,
            -207 => NetError::CertInvalid,
            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -302 => NetError::UnknownUrlScheme,
            -303 => NetError::InvalidRedirect,
            -310 => NetError::TooManyRedirects,
            -320 => NetError::InvalidResponse,
            -321 => NetError::InvalidChunkedEncoding,
            -322 => NetError::MethodNotSupported,
            -324 => NetError::EmptyResponse,
            -325 => NetError::ResponseHeadersTooBig,
            -330 => NetError::ContentDecodingFailed,
            -337 => NetError::Http2ProtocolError,
            -346 => NetError::ResponseHeadersMultipleContentLength,
            -351 => NetError::Http2ServerRefusedStream,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -361 => NetError::Http2FlowControlError,
            -362 => NetError::Http2FrameSizeError,
            -363 => NetError::Http2CompressionError,
            -376 => NetError::Http2StreamClosed,
            -903 => NetError::CookieInvalidPrefix,
            -904 => NetError::CookiePublicSuffix,
            -905 => NetError::CookieDomainMismatch,
            -906 => NetError::CookieInsecureOrigin,
            -907 => NetError::CookieInvalidSameSite,
            -908 => NetError::CookieParseFailed,
            _ => NetError::Unknown(code),
        }
    }
}
