//! HTTP/1.1 request/response exchange over a byte stream.
//! Roughly equivalent to net::HttpStreamParser.

use crate::base::context::net_error_from_io;
use crate::base::loadstate::{LoadState, LoadStateCell};
use crate::base::neterror::NetError;
use crate::http::chunked::ChunkedDecoder;
use crate::http::request::Request;
use crate::http::response::{BodyLength, Response, ResponseHead};
use bytes::{Buf, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 16 * 1024;

/// The outcome of one exchange.
#[derive(Debug)]
pub struct Exchange {
    pub response: Response,
    /// The connection is positioned at the start of the next response and
    /// the server allows another request on it.
    pub reusable: bool,
}

/// Drives one request over `io`. Every read is bounded by `read_timeout`.
pub struct HttpStreamParser<'a, S> {
    io: &'a mut S,
    buf: BytesMut,
    read_timeout: Duration,
    eof: bool,
    load_state: LoadStateCell,
}

impl<'a, S> HttpStreamParser<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: &'a mut S, read_timeout: Duration) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_CHUNK),
            read_timeout,
            eof: false,
            load_state: LoadStateCell::default(),
        }
    }

    pub fn with_load_state(mut self, cell: LoadStateCell) -> Self {
        self.load_state = cell;
        self
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<(), NetError> {
        self.load_state.set(LoadState::SendingRequest);
        let wire = request.serialize();
        let io = &mut *self.io;
        let write = async move {
            io.write_all(&wire).await?;
            io.flush().await
        };
        match tokio::time::timeout(self.read_timeout, write).await {
            Ok(result) => result.map_err(|e| net_error_from_io(&e))?,
            Err(_) => return Err(NetError::TimedOut),
        }
        self.load_state.set(LoadState::WaitingForResponse);
        Ok(())
    }

    /// Pull more bytes into the buffer. Returns `false` on EOF.
    async fn fill(&mut self) -> Result<bool, NetError> {
        if self.eof {
            return Ok(false);
        }
        self.buf.reserve(READ_CHUNK);
        let read = tokio::time::timeout(self.read_timeout, self.io.read_buf(&mut self.buf)).await;
        match read {
            Ok(Ok(0)) => {
                self.eof = true;
                Ok(false)
            }
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(net_error_from_io(&e)),
            Err(_) => Err(NetError::TimedOut),
        }
    }

    /// Read the final response head, skipping interim 1xx responses other
    /// than 101.
    pub async fn read_head(&mut self) -> Result<ResponseHead, NetError> {
        loop {
            if let Some((head, len)) = ResponseHead::parse(&self.buf)? {
                self.buf.advance(len);
                if (100..200).contains(&head.status) && head.status != 101 {
                    tracing::trace!(status = head.status, "skipping interim response");
                    continue;
                }
                return Ok(head);
            }
            if !self.fill().await? {
                return Err(if self.buf.is_empty() {
                    NetError::EmptyResponse
                } else {
                    NetError::ConnectionClosed
                });
            }
        }
    }

    /// Read the body framed as `length`. Returns the raw (still content-coded)
    /// body and whether the framing left the connection reusable.
    pub async fn read_body(&mut self, length: BodyLength) -> Result<(Bytes, bool), NetError> {
        match length {
            BodyLength::Empty => Ok((Bytes::new(), true)),
            BodyLength::ContentLength(n) => {
                while self.buf.len() < n {
                    if !self.fill().await? {
                        return Err(NetError::ContentLengthMismatch);
                    }
                }
                Ok((self.buf.split_to(n).freeze(), true))
            }
            BodyLength::Chunked => {
                let mut decoder = ChunkedDecoder::new();
                let mut body = BytesMut::new();
                loop {
                    let used = decoder.decode(&self.buf, &mut body)?;
                    self.buf.advance(used);
                    if decoder.is_complete() {
                        return Ok((body.freeze(), true));
                    }
                    if !self.fill().await? {
                        return Err(NetError::IncompleteChunkedEncoding);
                    }
                }
            }
            BodyLength::UntilClose => {
                while self.fill().await? {}
                Ok((self.buf.split().freeze(), false))
            }
        }
    }

    /// Read a complete response to `request`.
    pub async fn read_response(&mut self, head_request: bool) -> Result<Exchange, NetError> {
        let head = self.read_head().await?;
        if head.status == 101 {
            // The connection now speaks another protocol.
            return Ok(Exchange { response: Response::from_parts(head, Bytes::new())?, reusable: false });
        }
        self.load_state.set(LoadState::ReadingResponse);
        let keep_alive = head.keep_alive();
        let (raw_body, framed) = self.read_body(head.body_length(head_request)?).await?;
        // Bytes past the body mean the server misbehaved; do not reuse.
        let reusable = keep_alive && framed && self.buf.is_empty() && !self.eof;
        Ok(Exchange { response: Response::from_parts(head, raw_body)?, reusable })
    }
}
