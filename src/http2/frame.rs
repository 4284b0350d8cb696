//! HTTP/2 frame encoding and decoding (RFC 7540 Section 4 and 6).
//!
//! Every frame starts with a fixed 9-byte header:
//! ```text
//! +-----------------------------------------------+
//! |                 Length (24)                   |
//! +---------------+---------------+---------------+
//! |   Type (8)    |   Flags (8)   |
//! +-+-------------+---------------+---------------+
//! |R|                 Stream Identifier (31)      |
//! +-+---------------------------------------------+
//! ```

use super::error::{ErrorCode, H2Error};
use super::settings::{decode_params, encode_params, Setting};
use bytes::{BufMut, Bytes, BytesMut};

pub const FRAME_HEADER_LEN: usize = 9;

/// Client connection preface (RFC 7540 Section 3.5).
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const FRAME_DATA: u8 = 0x0;
pub const FRAME_HEADERS: u8 = 0x1;
pub const FRAME_PRIORITY: u8 = 0x2;
pub const FRAME_RST_STREAM: u8 = 0x3;
pub const FRAME_SETTINGS: u8 = 0x4;
pub const FRAME_PUSH_PROMISE: u8 = 0x5;
pub const FRAME_PING: u8 = 0x6;
pub const FRAME_GOAWAY: u8 = 0x7;
pub const FRAME_WINDOW_UPDATE: u8 = 0x8;
pub const FRAME_CONTINUATION: u8 = 0x9;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `flow_len` is the full payload length, padding included, which is
    /// what counts against flow control.
    Data { stream_id: u32, payload: Bytes, end_stream: bool, flow_len: u32 },
    /// Header block fragment; any priority fields are dropped on decode.
    Headers { stream_id: u32, fragment: Bytes, end_stream: bool, end_headers: bool },
    Priority { stream_id: u32 },
    RstStream { stream_id: u32, error_code: ErrorCode },
    Settings { ack: bool, params: Vec<Setting> },
    PushPromise { stream_id: u32, promised_stream_id: u32 },
    Ping { ack: bool, opaque_data: [u8; 8] },
    GoAway { last_stream_id: u32, error_code: ErrorCode, debug_data: Bytes },
    WindowUpdate { stream_id: u32, increment: u32 },
    Continuation { stream_id: u32, fragment: Bytes, end_headers: bool },
    /// Unknown frame types are ignored (RFC 7540 Section 4.1).
    Unknown { frame_type: u8, stream_id: u32 },
}

/// Decoded 9-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

pub fn encode_frame_header(
    buf: &mut impl BufMut,
    length: usize,
    frame_type: u8,
    flags: u8,
    stream_id: u32,
) {
    let length = length as u32;
    buf.put_u8((length >> 16) as u8);
    buf.put_u8((length >> 8) as u8);
    buf.put_u8(length as u8);
    buf.put_u8(frame_type);
    buf.put_u8(flags);
    buf.put_u32(stream_id & STREAM_ID_MASK);
}

/// Returns `None` if `buf` holds fewer than 9 bytes.
pub fn decode_frame_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < FRAME_HEADER_LEN {
        return None;
    }
    Some(FrameHeader {
        length: u32::from_be_bytes([0, buf[0], buf[1], buf[2]]),
        frame_type: buf[3],
        flags: buf[4],
        stream_id: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & STREAM_ID_MASK,
    })
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

impl Frame {
    /// Append the wire form of this frame to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Frame::Data { stream_id, payload, end_stream, .. } => {
                let flags = if *end_stream { FLAG_END_STREAM } else { 0 };
                encode_frame_header(buf, payload.len(), FRAME_DATA, flags, *stream_id);
                buf.extend_from_slice(payload);
            }
            Frame::Headers { stream_id, fragment, end_stream, end_headers } => {
                let mut flags = 0;
                if *end_stream {
                    flags |= FLAG_END_STREAM;
                }
                if *end_headers {
                    flags |= FLAG_END_HEADERS;
                }
                encode_frame_header(buf, fragment.len(), FRAME_HEADERS, flags, *stream_id);
                buf.extend_from_slice(fragment);
            }
            Frame::Priority { stream_id } => {
                encode_frame_header(buf, 5, FRAME_PRIORITY, 0, *stream_id);
                buf.put_u32(0);
                buf.put_u8(15);
            }
            Frame::RstStream { stream_id, error_code } => {
                encode_frame_header(buf, 4, FRAME_RST_STREAM, 0, *stream_id);
                buf.put_u32(*error_code as u32);
            }
            Frame::Settings { ack, params } => {
                if *ack {
                    encode_frame_header(buf, 0, FRAME_SETTINGS, FLAG_ACK, 0);
                } else {
                    encode_frame_header(buf, params.len() * 6, FRAME_SETTINGS, 0, 0);
                    encode_params(params, buf);
                }
            }
            Frame::PushPromise { stream_id, promised_stream_id } => {
                encode_frame_header(buf, 4, FRAME_PUSH_PROMISE, FLAG_END_HEADERS, *stream_id);
                buf.put_u32(*promised_stream_id & STREAM_ID_MASK);
            }
            Frame::Ping { ack, opaque_data } => {
                let flags = if *ack { FLAG_ACK } else { 0 };
                encode_frame_header(buf, 8, FRAME_PING, flags, 0);
                buf.extend_from_slice(opaque_data);
            }
            Frame::GoAway { last_stream_id, error_code, debug_data } => {
                encode_frame_header(buf, 8 + debug_data.len(), FRAME_GOAWAY, 0, 0);
                buf.put_u32(*last_stream_id & STREAM_ID_MASK);
                buf.put_u32(*error_code as u32);
                buf.extend_from_slice(debug_data);
            }
            Frame::WindowUpdate { stream_id, increment } => {
                encode_frame_header(buf, 4, FRAME_WINDOW_UPDATE, 0, *stream_id);
                buf.put_u32(*increment & STREAM_ID_MASK);
            }
            Frame::Continuation { stream_id, fragment, end_headers } => {
                let flags = if *end_headers { FLAG_END_HEADERS } else { 0 };
                encode_frame_header(buf, fragment.len(), FRAME_CONTINUATION, flags, *stream_id);
                buf.extend_from_slice(fragment);
            }
            Frame::Unknown { frame_type, stream_id } => {
                encode_frame_header(buf, 0, *frame_type, 0, *stream_id);
            }
        }
    }
}

/// Write a complete header block as HEADERS followed by as many
/// CONTINUATION frames as `max_frame_size` requires.
///
/// The frames land contiguously in `buf`; the connection's writer task
/// writes `buf` in one go so no other stream can interleave.
pub fn encode_header_block(
    buf: &mut BytesMut,
    stream_id: u32,
    block: &[u8],
    end_stream: bool,
    max_frame_size: usize,
) {
    let max = max_frame_size.max(1);
    let mut chunks = block.chunks(max);
    let first = chunks.next().unwrap_or(&[]);
    let rest: Vec<&[u8]> = chunks.collect();

    Frame::Headers {
        stream_id,
        fragment: Bytes::copy_from_slice(first),
        end_stream,
        end_headers: rest.is_empty(),
    }
    .encode(buf);

    let last = rest.len().saturating_sub(1);
    for (i, chunk) in rest.iter().enumerate() {
        Frame::Continuation {
            stream_id,
            fragment: Bytes::copy_from_slice(chunk),
            end_headers: i == last,
        }
        .encode(buf);
    }
}

/// Decode one frame from the start of `buf`.
///
/// Returns `Ok(None)` if more bytes are needed. Every error is
/// connection-fatal.
pub fn decode_frame(buf: &[u8], max_frame_size: u32) -> Result<Option<(Frame, usize)>, H2Error> {
    let Some(header) = decode_frame_header(buf) else {
        return Ok(None);
    };
    if header.length > max_frame_size {
        return Err(H2Error::FrameSize);
    }
    let total = FRAME_HEADER_LEN + header.length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let payload = &buf[FRAME_HEADER_LEN..total];
    let FrameHeader { flags, stream_id, .. } = header;

    let frame = match header.frame_type {
        FRAME_DATA => {
            if stream_id == 0 {
                return Err(H2Error::Protocol("DATA on stream 0"));
            }
            Frame::Data {
                stream_id,
                payload: Bytes::copy_from_slice(strip_padding(payload, flags)?),
                end_stream: flags & FLAG_END_STREAM != 0,
                flow_len: header.length,
            }
        }
        FRAME_HEADERS => {
            if stream_id == 0 {
                return Err(H2Error::Protocol("HEADERS on stream 0"));
            }
            let mut data = strip_padding(payload, flags)?;
            if flags & FLAG_PRIORITY != 0 {
                if data.len() < 5 {
                    return Err(H2Error::FrameSize);
                }
                data = &data[5..];
            }
            Frame::Headers {
                stream_id,
                fragment: Bytes::copy_from_slice(data),
                end_stream: flags & FLAG_END_STREAM != 0,
                end_headers: flags & FLAG_END_HEADERS != 0,
            }
        }
        FRAME_PRIORITY => {
            if stream_id == 0 {
                return Err(H2Error::Protocol("PRIORITY on stream 0"));
            }
            if payload.len() != 5 {
                return Err(H2Error::FrameSize);
            }
            Frame::Priority { stream_id }
        }
        FRAME_RST_STREAM => {
            if stream_id == 0 {
                return Err(H2Error::Protocol("RST_STREAM on stream 0"));
            }
            if payload.len() != 4 {
                return Err(H2Error::FrameSize);
            }
            Frame::RstStream { stream_id, error_code: ErrorCode::from_u32(read_u32(payload)) }
        }
        FRAME_SETTINGS => {
            if stream_id != 0 {
                return Err(H2Error::Protocol("SETTINGS on non-zero stream"));
            }
            let ack = flags & FLAG_ACK != 0;
            if ack && !payload.is_empty() {
                return Err(H2Error::FrameSize);
            }
            Frame::Settings { ack, params: decode_params(payload)? }
        }
        FRAME_PUSH_PROMISE => {
            if stream_id == 0 {
                return Err(H2Error::Protocol("PUSH_PROMISE on stream 0"));
            }
            let data = strip_padding(payload, flags)?;
            if data.len() < 4 {
                return Err(H2Error::FrameSize);
            }
            Frame::PushPromise { stream_id, promised_stream_id: read_u32(data) & STREAM_ID_MASK }
        }
        FRAME_PING => {
            if stream_id != 0 {
                return Err(H2Error::Protocol("PING on non-zero stream"));
            }
            let opaque_data: [u8; 8] = payload.try_into().map_err(|_| H2Error::FrameSize)?;
            Frame::Ping { ack: flags & FLAG_ACK != 0, opaque_data }
        }
        FRAME_GOAWAY => {
            if stream_id != 0 {
                return Err(H2Error::Protocol("GOAWAY on non-zero stream"));
            }
            if payload.len() < 8 {
                return Err(H2Error::FrameSize);
            }
            Frame::GoAway {
                last_stream_id: read_u32(payload) & STREAM_ID_MASK,
                error_code: ErrorCode::from_u32(read_u32(&payload[4..])),
                debug_data: Bytes::copy_from_slice(&payload[8..]),
            }
        }
        FRAME_WINDOW_UPDATE => {
            if payload.len() != 4 {
                return Err(H2Error::FrameSize);
            }
            let increment = read_u32(payload) & STREAM_ID_MASK;
            // A zero increment on a stream only fails that stream.
            if increment == 0 && stream_id == 0 {
                return Err(H2Error::Protocol("WINDOW_UPDATE with 0 increment"));
            }
            Frame::WindowUpdate { stream_id, increment }
        }
        FRAME_CONTINUATION => {
            if stream_id == 0 {
                return Err(H2Error::Protocol("CONTINUATION on stream 0"));
            }
            Frame::Continuation {
                stream_id,
                fragment: Bytes::copy_from_slice(payload),
                end_headers: flags & FLAG_END_HEADERS != 0,
            }
        }
        frame_type => Frame::Unknown { frame_type, stream_id },
    };

    Ok(Some((frame, total)))
}

fn strip_padding(payload: &[u8], flags: u8) -> Result<&[u8], H2Error> {
    if flags & FLAG_PADDED == 0 {
        return Ok(payload);
    }
    let (&pad_len, rest) = payload.split_first().ok_or(H2Error::FrameSize)?;
    let pad_len = usize::from(pad_len);
    if pad_len > rest.len() {
        return Err(H2Error::Protocol("padding exceeds payload"));
    }
    Ok(&rest[..rest.len() - pad_len])
}
